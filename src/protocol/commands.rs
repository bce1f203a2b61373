//! Request commands understood by the sensor firmware.
//!
//! Commands are plain ASCII lines written to the UART RX characteristic.
//! The device answers asynchronously on UART TX; nothing in the reply ties it
//! back to the request other than its shape.

/// Request commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Ask for the battery voltage (`Battery voltage (mV): N`).
    GetBatteryVoltage,
    /// Ask for the sensor data (`Temperature value (0.01 degC): N`).
    GetSensorData,
}

impl Command {
    /// Commands issued during one poll, in order.
    pub const POLL_SEQUENCE: [Command; 2] = [Command::GetBatteryVoltage, Command::GetSensorData];

    /// The newline-terminated wire form of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetBatteryVoltage => "GET_BATT_VOLTAGE\n",
            Self::GetSensorData => "GET_SENSOR_DATA\n",
        }
    }

    /// The command as bytes ready to be written.
    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str().trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(Command::GetBatteryVoltage.as_bytes(), b"GET_BATT_VOLTAGE\n");
        assert_eq!(Command::GetSensorData.as_bytes(), b"GET_SENSOR_DATA\n");
    }

    #[test]
    fn test_poll_sequence_order() {
        assert_eq!(
            Command::POLL_SEQUENCE,
            [Command::GetBatteryVoltage, Command::GetSensorData]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::GetSensorData.to_string(), "GET_SENSOR_DATA");
    }
}
