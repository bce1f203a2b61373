//! Mock transport for testing.
//!
//! Provides a scriptable in-memory [`BleTransport`] so acquisition, polling,
//! discovery and interactive sessions can be exercised without BLE hardware.
//!
//! # Features
//!
//! - **Scripted replies**: each written command can trigger one or more
//!   notifications after a delay
//! - **Failure injection**: fail at connect, discovery, subscription, write or
//!   disconnect
//! - **Latency simulation**: delay connection establishment
//! - **Call accounting**: count connects, discoveries and disconnects, record writes
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ble_sensor_exporter::mock::{MockPeripheral, MockTransport};
//!
//! let transport = MockTransport::new();
//! let stats = transport.add(
//!     MockPeripheral::new("AA:BB")
//!         .reply("GET_BATT_VOLTAGE\n", "Battery voltage (mV): 3300", Duration::from_millis(50)),
//! );
//! assert_eq!(stats.connects(), 0);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::ble::transport::{
    Advertisement, AdvertisementStream, BleConnection, BleTransport, GattCharacteristic,
    GattService, NotificationStream,
};
use crate::ble::uuids::*;
use crate::error::{Error, Result};

/// Step at which a [`MockPeripheral`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    /// Connection establishment is refused.
    Connect,
    /// Service discovery returns an error.
    Discover,
    /// Enabling notifications returns an error.
    Subscribe,
    /// Every write returns an error.
    Write,
    /// Disconnecting returns an error (the link is still torn down).
    Disconnect,
}

#[derive(Debug, Clone)]
struct ScriptedReply {
    trigger: Bytes,
    payload: Bytes,
    delay: Duration,
}

/// Call counters shared between a [`MockPeripheral`] and the test.
#[derive(Debug, Default)]
pub struct MockStats {
    connects: AtomicUsize,
    discoveries: AtomicUsize,
    subscriptions: AtomicUsize,
    disconnects: AtomicUsize,
    writes: Mutex<Vec<Bytes>>,
}

impl MockStats {
    /// Number of connection attempts.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of service discovery attempts.
    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    /// Number of subscription attempts.
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Number of disconnect attempts.
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Every payload written, in order.
    pub fn writes(&self) -> Vec<Bytes> {
        self.writes.lock().clone()
    }
}

/// A simulated device.
#[derive(Debug, Clone)]
pub struct MockPeripheral {
    address: String,
    local_name: String,
    rssi: Option<i16>,
    replies: Vec<ScriptedReply>,
    failure: Option<FailurePoint>,
    connect_latency: Duration,
    has_uart: bool,
    stats: Arc<MockStats>,
}

impl MockPeripheral {
    /// Create a device exposing the UART service that answers nothing.
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            local_name: String::new(),
            rssi: Some(-60),
            replies: Vec::new(),
            failure: None,
            connect_latency: Duration::ZERO,
            has_uart: true,
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Notify `payload` on TX `delay` after `command` is written to RX.
    pub fn reply(mut self, command: &str, payload: &str, delay: Duration) -> Self {
        self.replies.push(ScriptedReply {
            trigger: Bytes::copy_from_slice(command.as_bytes()),
            payload: Bytes::copy_from_slice(payload.as_bytes()),
            delay,
        });
        self
    }

    /// Fail at the given step.
    pub fn fail_at(mut self, failure: FailurePoint) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Take `latency` to establish a connection.
    pub fn with_connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Expose no UART service.
    pub fn without_uart(mut self) -> Self {
        self.has_uart = false;
        self
    }

    /// Advertised name and signal strength, used by [`MockTransport::advertise_all`].
    pub fn with_advertisement(mut self, local_name: &str, rssi: Option<i16>) -> Self {
        self.local_name = local_name.to_string();
        self.rssi = rssi;
        self
    }

    /// Counters for this device.
    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }

    fn fails_at(&self, point: FailurePoint) -> bool {
        self.failure == Some(point)
    }

    fn services(&self) -> Vec<GattService> {
        let mut services = vec![GattService {
            uuid: Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb),
            characteristics: Vec::new(),
        }];
        if self.has_uart {
            let characteristic = |uuid| GattCharacteristic {
                uuid,
                service_uuid: UART_SERVICE_UUID,
            };
            services.push(GattService {
                uuid: UART_SERVICE_UUID,
                characteristics: vec![characteristic(UART_RX_UUID), characteristic(UART_TX_UUID)],
            });
        }
        services
    }
}

fn injected(point: FailurePoint) -> Error {
    Error::Internal(format!("injected {:?} failure", point))
}

/// In-memory transport holding a set of [`MockPeripheral`]s.
#[derive(Debug, Default)]
pub struct MockTransport {
    peripherals: RwLock<HashMap<String, MockPeripheral>>,
    advertisements: Mutex<Vec<Advertisement>>,
}

impl MockTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and return its counters.
    pub fn add(&self, peripheral: MockPeripheral) -> Arc<MockStats> {
        let stats = peripheral.stats();
        self.peripherals
            .write()
            .insert(peripheral.address.clone(), peripheral);
        stats
    }

    /// Queue one advertisement for the next [`BleTransport::advertisements`] stream.
    pub fn advertise(&self, address: &str, local_name: &str, rssi: Option<i16>) {
        self.advertisements.lock().push(Advertisement {
            address: address.to_string(),
            local_name: local_name.to_string(),
            rssi,
        });
    }

    /// Queue an advertisement for every registered device.
    pub fn advertise_all(&self) {
        let peripherals: Vec<_> = self.peripherals.read().values().cloned().collect();
        for p in peripherals {
            self.advertise(&p.address, &p.local_name, p.rssi);
        }
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn connect(&self, address: &str, timeout: Duration) -> Result<Box<dyn BleConnection>> {
        let peripheral = self
            .peripherals
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound {
                address: address.to_string(),
            })?;

        peripheral.stats.connects.fetch_add(1, Ordering::SeqCst);

        if peripheral.connect_latency > timeout {
            tokio::time::sleep(timeout).await;
            // A timed-out connect is cancelled with one disconnect.
            peripheral.stats.disconnects.fetch_add(1, Ordering::SeqCst);
            return Err(Error::ConnectionTimeout { timeout });
        }
        tokio::time::sleep(peripheral.connect_latency).await;

        if peripheral.fails_at(FailurePoint::Connect) {
            return Err(Error::ConnectionFailed {
                reason: "injected Connect failure".to_string(),
            });
        }

        Ok(Box::new(MockConnection {
            peripheral,
            notifier: Mutex::new(None),
        }))
    }

    async fn advertisements(&self) -> Result<AdvertisementStream> {
        let queued = std::mem::take(&mut *self.advertisements.lock());
        Ok(stream::iter(queued).boxed())
    }
}

/// Connection to a [`MockPeripheral`].
struct MockConnection {
    peripheral: MockPeripheral,
    notifier: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

#[async_trait]
impl BleConnection for MockConnection {
    async fn discover_services(&self, filter: &[Uuid]) -> Result<Vec<GattService>> {
        self.peripheral
            .stats
            .discoveries
            .fetch_add(1, Ordering::SeqCst);

        if self.peripheral.fails_at(FailurePoint::Discover) {
            return Err(injected(FailurePoint::Discover));
        }

        Ok(self
            .peripheral
            .services()
            .into_iter()
            .filter(|s| filter.is_empty() || filter.contains(&s.uuid))
            .collect())
    }

    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<NotificationStream> {
        self.peripheral
            .stats
            .subscriptions
            .fetch_add(1, Ordering::SeqCst);

        if self.peripheral.fails_at(FailurePoint::Subscribe) {
            return Err(injected(FailurePoint::Subscribe));
        }
        if characteristic.uuid != UART_TX_UUID {
            return Err(Error::CharacteristicNotFound {
                uuid: characteristic.uuid.to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded();
        *self.notifier.lock() = Some(tx);
        Ok(rx.boxed())
    }

    async fn write_without_response(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
    ) -> Result<()> {
        let data = Bytes::copy_from_slice(data);
        self.peripheral.stats.writes.lock().push(data.clone());

        if self.peripheral.fails_at(FailurePoint::Write) {
            return Err(injected(FailurePoint::Write));
        }
        if characteristic.uuid != UART_RX_UUID {
            return Err(Error::CharacteristicNotFound {
                uuid: characteristic.uuid.to_string(),
            });
        }

        let Some(notifier) = self.notifier.lock().clone() else {
            return Ok(());
        };

        for reply in self.peripheral.replies.iter().filter(|r| r.trigger == data) {
            let notifier = notifier.clone();
            let reply = reply.clone();
            tokio::spawn(async move {
                tokio::time::sleep(reply.delay).await;
                let _ = notifier.unbounded_send(reply.payload);
            });
        }

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral
            .stats
            .disconnects
            .fetch_add(1, Ordering::SeqCst);

        // Dropping the sender ends the notification stream.
        self.notifier.lock().take();

        if self.peripheral.fails_at(FailurePoint::Disconnect) {
            return Err(injected(FailurePoint::Disconnect));
        }
        Ok(())
    }
}
