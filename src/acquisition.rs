//! One acquisition cycle against a single device.
//!
//! A cycle connects, locates the UART characteristics, subscribes to TX,
//! writes the poll commands to RX, collects replies for a fixed window and
//! disconnects. Every step can fail on its own; once a connection exists it
//! is always released, whatever happened after it was established.
//!
//! Replies carry no correlation with the request that caused them, so they are
//! recognised by shape alone and may arrive in any order. Each recognised
//! reply is published to the [`MetricsSink`] as soon as it is decoded, so
//! values can be exported even if a later step of the same cycle fails.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::ble::transport::{BleConnection, BleTransport, GattCharacteristic};
use crate::ble::uart::UartChannel;
use crate::config::{DeviceDescriptor, Timing};
use crate::error::Error;
use crate::metrics::{DeviceLabels, MetricsSink};
use crate::protocol::{Command, Reply};
use crate::utils::centi_celsius_to_fahrenheit;

/// Step of a cycle, used to report where it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleStage {
    /// Establishing the connection.
    Connect,
    /// Locating the UART service and characteristics.
    Discover,
    /// Enabling TX notifications.
    Subscribe,
    /// Writing a command to RX.
    Write,
    /// Releasing the connection.
    Disconnect,
}

impl std::fmt::Display for CycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Discover => write!(f, "discover"),
            Self::Subscribe => write!(f, "subscribe"),
            Self::Write => write!(f, "write"),
            Self::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Why a cycle failed.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct CycleError {
    /// The step that failed.
    pub stage: CycleStage,
    /// The underlying error.
    #[source]
    pub source: Error,
}

impl CycleError {
    /// Attach a stage to an error.
    pub fn new(stage: CycleStage, source: Error) -> Self {
        Self { stage, source }
    }

    fn at(stage: CycleStage) -> impl FnOnce(Error) -> Self {
        move |source| Self::new(stage, source)
    }
}

/// Values decoded during one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    /// Battery voltage in millivolts, if a battery reply arrived.
    pub battery_millivolts: Option<i64>,
    /// Temperature in Fahrenheit, if a temperature reply arrived.
    pub temperature_fahrenheit: Option<f64>,
}

/// Result of one cycle.
#[derive(Debug)]
pub struct Acquisition {
    /// Time from connect request to established link; `None` if connect failed.
    pub latency: Option<Duration>,
    /// Decoded readings, or where the cycle failed.
    pub outcome: Result<Readings, CycleError>,
}

impl Acquisition {
    /// Decoded readings of a successful cycle.
    pub fn readings(&self) -> Option<&Readings> {
        self.outcome.as_ref().ok()
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&CycleError> {
        self.outcome.as_ref().err()
    }

    /// One human-readable console line describing the cycle.
    pub fn summary(&self, device_name: &str) -> String {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        match &self.outcome {
            Ok(readings) => {
                let temperature = readings
                    .temperature_fahrenheit
                    .map(|f| format!("{:.2}", f))
                    .unwrap_or_else(|| "--".to_string());
                let battery = readings
                    .battery_millivolts
                    .map(|mv| mv.to_string())
                    .unwrap_or_else(|| "--".to_string());
                format!(
                    "[{}] {}   Temp: {} F  Battery: {} mV",
                    now, device_name, temperature, battery
                )
            }
            Err(e) => format!("[{}] {}   poll failed: {}", now, device_name, e),
        }
    }
}

/// Runs acquisition cycles against a transport, publishing into a sink.
#[derive(Clone)]
pub struct Acquirer {
    transport: Arc<dyn BleTransport>,
    sink: Arc<dyn MetricsSink>,
    timing: Timing,
}

impl Acquirer {
    /// Create an acquirer.
    pub fn new(transport: Arc<dyn BleTransport>, sink: Arc<dyn MetricsSink>, timing: Timing) -> Self {
        Self {
            transport,
            sink,
            timing,
        }
    }

    /// Protocol timing in use.
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Run one complete cycle against `device`.
    ///
    /// Never fails as a whole: errors are reported in [`Acquisition::outcome`].
    pub async fn run(&self, device: &DeviceDescriptor) -> Acquisition {
        let labels = device.labels();

        debug!(device = %device.name, address = %device.address, "Connecting");
        let started = Instant::now();
        let connection = match self
            .transport
            .connect(&device.address, self.timing.connect_timeout)
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                return Acquisition {
                    latency: None,
                    outcome: Err(CycleError::new(CycleStage::Connect, e)),
                }
            }
        };

        let latency = started.elapsed();
        self.sink
            .set_connection_latency(&labels, latency.as_secs_f64());
        debug!(device = %device.name, ?latency, "Connected");

        let exchanged = self.exchange(connection.as_ref(), &labels).await;
        let released = connection
            .disconnect()
            .await
            .map_err(CycleError::at(CycleStage::Disconnect));

        let outcome = match (exchanged, released) {
            (Ok(readings), Ok(())) => Ok(readings),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(disconnect)) => {
                warn!(device = %device.name, "Also failed to release connection: {}", disconnect);
                Err(e)
            }
        };

        Acquisition {
            latency: Some(latency),
            outcome,
        }
    }

    /// Everything between connect and disconnect.
    async fn exchange(
        &self,
        connection: &dyn BleConnection,
        labels: &DeviceLabels,
    ) -> Result<Readings, CycleError> {
        let uart = UartChannel::discover(connection)
            .await
            .map_err(CycleError::at(CycleStage::Discover))?;

        let mut notifications = connection
            .subscribe(&uart.tx)
            .await
            .map_err(CycleError::at(CycleStage::Subscribe))?
            .fuse();

        let mut readings = Readings::default();

        let commands = self.send_commands(connection, &uart.rx);
        tokio::pin!(commands);

        loop {
            tokio::select! {
                result = &mut commands => return result.map(|()| readings),
                Some(payload) = notifications.next() => {
                    self.record(&payload, labels, &mut readings);
                }
            }
        }
    }

    /// Write the poll commands in order, then wait out the collection window.
    async fn send_commands(
        &self,
        connection: &dyn BleConnection,
        rx: &GattCharacteristic,
    ) -> Result<(), CycleError> {
        for (i, command) in Command::POLL_SEQUENCE.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.timing.command_pacing).await;
            }
            trace!("Sending {}", command);
            connection
                .write_without_response(rx, command.as_bytes())
                .await
                .map_err(CycleError::at(CycleStage::Write))?;
        }

        // No end-of-reply signal exists; always wait the full window.
        tokio::time::sleep(self.timing.collection_window).await;
        Ok(())
    }

    /// Decode one notification and publish it.
    fn record(&self, payload: &[u8], labels: &DeviceLabels, readings: &mut Readings) {
        match Reply::parse(payload) {
            Some(Reply::BatteryVoltage(mv)) => {
                readings.battery_millivolts = Some(mv);
                self.sink.set_battery_millivolts(labels, mv);
            }
            Some(Reply::Temperature(centi)) => {
                let fahrenheit = centi_celsius_to_fahrenheit(centi);
                readings.temperature_fahrenheit = Some(fahrenheit);
                self.sink.set_temperature_fahrenheit(labels, fahrenheit);
            }
            None => trace!(
                "Ignoring reply from {}: {:?}",
                labels.name,
                String::from_utf8_lossy(payload)
            ),
        }
    }
}
