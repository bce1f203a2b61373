//! BLE Service and Characteristic UUIDs.
//!
//! The sensors expose the Nordic UART Service (NUS): one characteristic that
//! accepts writes (the device's serial RX) and one that emits notifications
//! (the device's serial TX).

use uuid::Uuid;

/// Nordic UART Service UUID.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
/// UART RX characteristic UUID (write to device).
pub const UART_RX_UUID: Uuid = Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e24dcca9e);
/// UART TX characteristic UUID (notifications from device).
pub const UART_TX_UUID: Uuid = Uuid::from_u128(0x6e40_0003_b5a3_f393_e0a9_e50e24dcca9e);

/// Check if a service UUID is the UART service.
pub fn is_uart_service(uuid: &Uuid) -> bool {
    *uuid == UART_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            UART_SERVICE_UUID.to_string(),
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
        );
        assert_eq!(UART_RX_UUID.to_string(), "6e400002-b5a3-f393-e0a9-e50e24dcca9e");
        assert_eq!(UART_TX_UUID.to_string(), "6e400003-b5a3-f393-e0a9-e50e24dcca9e");
    }

    #[test]
    fn test_is_uart_service() {
        assert!(is_uart_service(&UART_SERVICE_UUID));
        assert!(!is_uart_service(&UART_TX_UUID));
    }
}
