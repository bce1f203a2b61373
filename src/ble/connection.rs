//! BLE connection handling.
//!
//! A [`PeripheralConnection`] wraps one connected btleplug peripheral for the
//! duration of a single acquisition or interactive session.

use async_trait::async_trait;
use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use tracing::{debug, error};
use uuid::Uuid;

use crate::ble::characteristics::CharacteristicHandler;
use crate::ble::transport::{BleConnection, GattCharacteristic, GattService, NotificationStream};
use crate::error::{Error, Result};

/// An established connection to a peripheral.
pub struct PeripheralConnection {
    /// Address the connection was requested for.
    address: String,
    /// The connected peripheral.
    peripheral: Peripheral,
    /// Characteristic handler.
    characteristics: CharacteristicHandler,
}

impl PeripheralConnection {
    /// Wrap an already connected peripheral.
    pub fn new(address: impl Into<String>, peripheral: Peripheral) -> Self {
        Self {
            address: address.into(),
            characteristics: CharacteristicHandler::new(peripheral.clone()),
            peripheral,
        }
    }
}

#[async_trait]
impl BleConnection for PeripheralConnection {
    async fn discover_services(&self, filter: &[Uuid]) -> Result<Vec<GattService>> {
        debug!("Discovering services on {}", self.address);
        self.characteristics.discover(filter).await
    }

    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<NotificationStream> {
        self.characteristics.subscribe(&characteristic.uuid).await
    }

    async fn write_without_response(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
    ) -> Result<()> {
        self.characteristics
            .write_without_response(&characteristic.uuid, data)
            .await
    }

    async fn disconnect(&self) -> Result<()> {
        match self.peripheral.disconnect().await {
            Ok(_) => {
                debug!("Disconnected from {}", self.address);
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect from {}: {}", self.address, e);
                Err(Error::Bluetooth(e))
            }
        }
    }
}
