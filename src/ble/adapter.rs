//! btleplug-backed transport.
//!
//! Enabling the transport picks the first Bluetooth adapter and starts a
//! continuous scan, so peripherals can later be looked up by address.

use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::ble::connection::PeripheralConnection;
use crate::ble::scanner::{advertisement_stream, display_address};
use crate::ble::transport::{AdvertisementStream, BleConnection, BleTransport};
use crate::error::{Error, Result};

/// How often the adapter's peripheral list is re-checked while looking up an address.
const LOOKUP_INTERVAL: Duration = Duration::from_millis(250);

/// BLE transport over the system's first Bluetooth adapter.
#[derive(Clone)]
pub struct BtleplugTransport {
    /// The BLE adapter in use.
    adapter: Adapter,
}

impl BtleplugTransport {
    /// Enable the adapter and start scanning.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available or scanning cannot start.
    pub async fn enable() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        Ok(Self { adapter })
    }

    /// Wait until the adapter knows a peripheral with the given address.
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        loop {
            for peripheral in self.adapter.peripherals().await? {
                let id = peripheral.id().to_string();
                let hardware = peripheral.address().to_string();
                if matches_address(address, &id, &hardware) {
                    return Ok(peripheral);
                }
            }
            tokio::time::sleep(LOOKUP_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn connect(&self, address: &str, timeout: Duration) -> Result<Box<dyn BleConnection>> {
        let deadline = Instant::now() + timeout;

        let peripheral = timeout_at(deadline, self.find_peripheral(address))
            .await
            .map_err(|_| Error::ConnectionTimeout { timeout })??;

        debug!("Connecting to {}", address);
        match timeout_at(deadline, peripheral.connect()).await {
            Ok(result) => result?,
            Err(_) => {
                // The platform may still finish the abandoned connect.
                if let Err(e) = peripheral.disconnect().await {
                    warn!("Failed to cancel timed-out connect to {}: {}", address, e);
                }
                return Err(Error::ConnectionTimeout { timeout });
            }
        }

        debug!(
            "Connected to {}",
            display_address(&peripheral.id(), peripheral.address())
        );

        Ok(Box::new(PeripheralConnection::new(address, peripheral)))
    }

    async fn advertisements(&self) -> Result<AdvertisementStream> {
        advertisement_stream(self.adapter.clone()).await
    }
}

/// Whether a peripheral identified by `id` / `hardware` is the one configured as `wanted`.
fn matches_address(wanted: &str, id: &str, hardware: &str) -> bool {
    let wanted = wanted.trim();
    wanted.eq_ignore_ascii_case(id) || wanted.eq_ignore_ascii_case(hardware)
}
