//! Locating the UART characteristics on a connected device.

use tracing::debug;
use uuid::Uuid;

use crate::ble::transport::{BleConnection, GattCharacteristic, GattService};
use crate::ble::uuids::*;
use crate::error::{Error, Result};

/// The two characteristics that make up the virtual serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartChannel {
    /// Notifications from the device.
    pub tx: GattCharacteristic,
    /// Writes to the device.
    pub rx: GattCharacteristic,
}

impl UartChannel {
    /// Discover the UART service on `connection` and pick out TX and RX.
    pub async fn discover(connection: &dyn BleConnection) -> Result<Self> {
        let services = connection.discover_services(&[UART_SERVICE_UUID]).await?;
        Self::from_services(&services)
    }

    /// Find TX and RX in an already discovered service list.
    pub fn from_services(services: &[GattService]) -> Result<Self> {
        let service = services
            .iter()
            .find(|s| is_uart_service(&s.uuid))
            .ok_or_else(|| Error::ServiceNotFound {
                uuid: UART_SERVICE_UUID.to_string(),
            })?;

        let characteristics = service.discover_characteristics(&[UART_TX_UUID, UART_RX_UUID]);
        let find = |wanted: Uuid| {
            characteristics
                .iter()
                .find(|c| c.uuid == wanted)
                .cloned()
                .ok_or_else(|| Error::CharacteristicNotFound {
                    uuid: wanted.to_string(),
                })
        };

        let channel = Self {
            tx: find(UART_TX_UUID)?,
            rx: find(UART_RX_UUID)?,
        };
        debug!("Found UART channel in service {}", service.uuid);
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn characteristic(uuid: Uuid) -> GattCharacteristic {
        GattCharacteristic {
            uuid,
            service_uuid: UART_SERVICE_UUID,
        }
    }

    #[test]
    fn test_from_services() {
        let services = vec![GattService {
            uuid: UART_SERVICE_UUID,
            characteristics: vec![characteristic(UART_RX_UUID), characteristic(UART_TX_UUID)],
        }];

        let channel = UartChannel::from_services(&services).unwrap();
        assert_eq!(channel.tx.uuid, UART_TX_UUID);
        assert_eq!(channel.rx.uuid, UART_RX_UUID);
    }

    #[test]
    fn test_missing_service() {
        let err = UartChannel::from_services(&[]).unwrap_err();
        assert!(matches!(err, Error::ServiceNotFound { .. }));
    }

    #[test]
    fn test_missing_rx() {
        let services = vec![GattService {
            uuid: UART_SERVICE_UUID,
            characteristics: vec![characteristic(UART_TX_UUID)],
        }];

        let err = UartChannel::from_services(&services).unwrap_err();
        match err {
            Error::CharacteristicNotFound { uuid } => assert_eq!(uuid, UART_RX_UUID.to_string()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
