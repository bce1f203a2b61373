//! Transport abstractions.
//!
//! The acquisition logic only needs a handful of BLE primitives. They are
//! expressed as the [`BleTransport`] and [`BleConnection`] traits so the same
//! code drives real radios (see [`crate::ble::adapter`]) and the scripted
//! in-memory transport in [`crate::mock`].

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use uuid::Uuid;

use crate::error::Result;

/// Stream of notification payloads from one subscribed characteristic.
///
/// Delivery order and exactly-once delivery are not guaranteed.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// Stream of advertisements observed while scanning.
pub type AdvertisementStream = Pin<Box<dyn Stream<Item = Advertisement> + Send>>;

/// A GATT characteristic as seen by the acquisition logic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GattCharacteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUID of the service that owns the characteristic.
    pub service_uuid: Uuid,
}

/// A discovered GATT service together with its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics of the service.
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    /// Characteristics whose UUID is in `filter`; all of them when `filter` is empty.
    pub fn discover_characteristics(&self, filter: &[Uuid]) -> Vec<GattCharacteristic> {
        self.characteristics
            .iter()
            .filter(|c| filter.is_empty() || filter.contains(&c.uuid))
            .cloned()
            .collect()
    }
}

impl std::fmt::Display for GattService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

/// One advertisement observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Link-layer address (or platform identifier where the address is hidden).
    pub address: String,
    /// Advertised local name, empty if none.
    pub local_name: String,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// Entry point into a BLE stack.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Connect to the device at `address`, giving up after `timeout`.
    async fn connect(&self, address: &str, timeout: Duration) -> Result<Box<dyn BleConnection>>;

    /// Start observing advertisements. The stream runs until dropped.
    async fn advertisements(&self) -> Result<AdvertisementStream>;
}

/// An established connection to one device.
///
/// Owned by a single caller for its whole lifetime and released with
/// [`BleConnection::disconnect`].
#[async_trait]
pub trait BleConnection: Send + Sync {
    /// Discover services whose UUID is in `filter`; all services when `filter` is empty.
    async fn discover_services(&self, filter: &[Uuid]) -> Result<Vec<GattService>>;

    /// Enable notifications on `characteristic` and return their payloads.
    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<NotificationStream>;

    /// Write `data` to `characteristic` without waiting for an acknowledgement.
    async fn write_without_response(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
    ) -> Result<()>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::*;

    fn uart_service() -> GattService {
        GattService {
            uuid: UART_SERVICE_UUID,
            characteristics: vec![
                GattCharacteristic {
                    uuid: UART_RX_UUID,
                    service_uuid: UART_SERVICE_UUID,
                },
                GattCharacteristic {
                    uuid: UART_TX_UUID,
                    service_uuid: UART_SERVICE_UUID,
                },
            ],
        }
    }

    #[test]
    fn test_discover_characteristics_filter() {
        let service = uart_service();
        assert_eq!(service.discover_characteristics(&[]).len(), 2);

        let tx = service.discover_characteristics(&[UART_TX_UUID]);
        assert_eq!(tx.len(), 1);
        assert_eq!(tx[0].uuid, UART_TX_UUID);

        assert!(service
            .discover_characteristics(&[UART_SERVICE_UUID])
            .is_empty());
    }

    #[test]
    fn test_service_display() {
        assert_eq!(
            uart_service().to_string(),
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
        );
    }
}
