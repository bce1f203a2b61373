//! Per-device polling loops.
//!
//! Each configured device gets its own task that runs one acquisition cycle
//! immediately and then one per interval, forever. Loops share nothing but
//! the transport, the sink and a shutdown token: a failing device only ever
//! affects its own loop, and only until its next tick.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acquisition::Acquirer;
use crate::config::{DeviceDescriptor, DEFAULT_POLL_INTERVAL};

/// Spawns and supervises one polling loop per device.
pub struct Poller {
    acquirer: Acquirer,
    shutdown: CancellationToken,
}

impl Poller {
    /// Create a poller.
    pub fn new(acquirer: Acquirer) -> Self {
        Self {
            acquirer,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops every loop when cancelled.
    ///
    /// Loops stop between cycles; a cycle already running completes and
    /// releases its connection first.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal every loop to stop.
    pub fn shutdown(&self) {
        info!("Stopping device polling");
        self.shutdown.cancel();
    }

    /// Start one loop per device.
    ///
    /// A zero default interval is replaced by [`DEFAULT_POLL_INTERVAL`].
    pub fn spawn(&self, devices: impl IntoIterator<Item = DeviceDescriptor>) -> Vec<JoinHandle<()>> {
        let mut default_interval = self.acquirer.timing().default_poll_interval;
        if default_interval.is_zero() {
            warn!(
                "Default poll interval is zero, using {:?}",
                DEFAULT_POLL_INTERVAL
            );
            default_interval = DEFAULT_POLL_INTERVAL;
        }

        devices
            .into_iter()
            .map(|device| {
                let interval = device.poll_interval_or(default_interval);
                info!(
                    "Polling {} ({}) every {:?}",
                    device.name, device.address, interval
                );
                tokio::spawn(poll_device(
                    self.acquirer.clone(),
                    device,
                    interval,
                    self.shutdown.clone(),
                ))
            })
            .collect()
    }
}

/// Poll one device until `shutdown` is cancelled. `interval` must be non-zero.
async fn poll_device(
    acquirer: Acquirer,
    device: DeviceDescriptor,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        poll_once(&acquirer, &device).await;

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
    }

    debug!("Polling loop for {} ended", device.name);
}

/// Run one cycle and report its outcome.
async fn poll_once(acquirer: &Acquirer, device: &DeviceDescriptor) {
    let acquisition = acquirer.run(device).await;

    if let Some(error) = acquisition.error() {
        warn!(
            device = %device.name,
            address = %device.address,
            stage = %error.stage,
            "Poll failed: {}",
            error
        );
    }

    println!("{}", acquisition.summary(&device.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::metrics::GaugeRegistry;
    use crate::mock::{FailurePoint, MockPeripheral, MockTransport};
    use std::sync::Arc;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_on_interval() {
        let transport = Arc::new(MockTransport::new());
        let stats = transport.add(MockPeripheral::new("AA:BB"));
        let acquirer = Acquirer::new(transport, Arc::new(GaugeRegistry::new()), Timing::default());
        let poller = Poller::new(acquirer);

        let handles =
            poller.spawn([DeviceDescriptor::new("sensor1", "AA:BB").with_poll_interval(secs(5))]);

        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(stats.connects(), 1);

        time::sleep(secs(5)).await;
        assert_eq!(stats.connects(), 2);

        time::sleep(secs(10)).await;
        assert_eq!(stats.connects(), 4);

        poller.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_interval() {
        let transport = Arc::new(MockTransport::new());
        let stats = transport.add(MockPeripheral::new("AA:BB"));
        let timing = Timing {
            default_poll_interval: secs(30),
            ..Timing::default()
        };
        let poller = Poller::new(Acquirer::new(
            transport,
            Arc::new(GaugeRegistry::new()),
            timing,
        ));

        let handles = poller.spawn([DeviceDescriptor::new("sensor1", "AA:BB")]);

        time::sleep(secs(29)).await;
        assert_eq!(stats.connects(), 1);
        time::sleep(secs(2)).await;
        assert_eq!(stats.connects(), 2);

        poller.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_default_interval_falls_back() {
        let transport = Arc::new(MockTransport::new());
        let stats = transport.add(MockPeripheral::new("AA:BB"));
        let config = crate::config::Config::from_yaml_str(
            "timing:\n  default_poll_interval: 0s\ndevices:\n  - name: sensor1\n    address: \"AA:BB\"\n",
        )
        .unwrap();
        let poller = Poller::new(Acquirer::new(
            transport,
            Arc::new(GaugeRegistry::new()),
            config.timing,
        ));

        let handles = poller.spawn(config.devices);

        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(stats.connects(), 1);
        time::sleep(DEFAULT_POLL_INTERVAL).await;
        assert_eq!(stats.connects(), 2);

        poller.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_device_keeps_polling_and_spares_others() {
        let transport = Arc::new(MockTransport::new());
        let broken = transport.add(MockPeripheral::new("AA:BB").fail_at(FailurePoint::Connect));
        let healthy = transport.add(MockPeripheral::new("CC:DD").reply(
            "GET_BATT_VOLTAGE\n",
            "Battery voltage (mV): 3000",
            Duration::from_millis(20),
        ));
        let registry = Arc::new(GaugeRegistry::new());
        let poller = Poller::new(Acquirer::new(transport, registry.clone(), Timing::default()));

        let healthy_device = DeviceDescriptor::new("good", "CC:DD").with_poll_interval(secs(2));
        let handles = poller.spawn([
            DeviceDescriptor::new("bad", "AA:BB").with_poll_interval(secs(2)),
            healthy_device.clone(),
        ]);

        time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(broken.connects(), 3);
        assert_eq!(healthy.connects(), 3);
        assert_eq!(
            registry
                .get(&healthy_device.labels())
                .unwrap()
                .battery_millivolts,
            Some(3000.0)
        );

        poller.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_inflight_cycle() {
        let transport = Arc::new(MockTransport::new());
        let stats = transport.add(MockPeripheral::new("AA:BB"));
        let poller = Poller::new(Acquirer::new(
            transport,
            Arc::new(GaugeRegistry::new()),
            Timing::default(),
        ));

        let handles = poller.spawn([DeviceDescriptor::new("sensor1", "AA:BB")]);

        // Mid-way through the collection window.
        time::sleep(Duration::from_millis(500)).await;
        poller.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(stats.connects(), 1);
        assert_eq!(stats.disconnects(), 1);
    }
}
