//! Reply parsing.
//!
//! Replies arrive as free-form text notifications. Only two shapes carry data:
//!
//! - `Battery voltage (mV): {int}`
//! - `Temperature value (0.01 degC): {int}`
//!
//! Anything else (other firmware chatter, truncated or coalesced buffers) is
//! not an error, it simply yields no value.

/// Literal text preceding the battery voltage.
pub const BATTERY_VOLTAGE_PREFIX: &str = "Battery voltage (mV):";
/// Literal text preceding the temperature.
pub const TEMPERATURE_PREFIX: &str = "Temperature value (0.01 degC):";

/// A decoded reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Battery voltage in millivolts.
    BatteryVoltage(i64),
    /// Temperature in hundredths of a degree Celsius.
    Temperature(i64),
}

impl Reply {
    /// Decode a notification payload, or `None` if it matches neither shape.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if let Some(mv) = parse_int(payload, BATTERY_VOLTAGE_PREFIX) {
            return Some(Self::BatteryVoltage(mv));
        }
        parse_int(payload, TEMPERATURE_PREFIX).map(Self::Temperature)
    }
}

/// Extract the integer following `prefix` in `payload`.
///
/// The payload must start with `prefix` exactly. Spaces between the prefix and
/// the number are skipped, an optional sign is accepted, and anything after the
/// digits (typically `\r\n`) is ignored.
pub fn parse_int(payload: &[u8], prefix: &str) -> Option<i64> {
    let text = std::str::from_utf8(payload).ok()?;
    let rest = text.strip_prefix(prefix)?.trim_start_matches(' ');

    let unsigned = rest.strip_prefix(['+', '-']).unwrap_or(rest);
    let digits = unsigned.len() - unsigned.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }

    let sign_len = rest.len() - unsigned.len();
    rest[..sign_len + digits].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_battery() {
        assert_eq!(
            Reply::parse(b"Battery voltage (mV): 3300"),
            Some(Reply::BatteryVoltage(3300))
        );
        assert_eq!(
            Reply::parse(b"Battery voltage (mV): 2987\r\n"),
            Some(Reply::BatteryVoltage(2987))
        );
    }

    #[test]
    fn test_parse_temperature() {
        let reply = Reply::parse(b"Temperature value (0.01 degC): 2500").unwrap();
        assert_eq!(reply, Reply::Temperature(2500));

        assert_eq!(
            Reply::parse(b"Temperature value (0.01 degC): -125"),
            Some(Reply::Temperature(-125))
        );
    }

    #[test]
    fn test_parse_mismatch() {
        assert_eq!(Reply::parse(b""), None);
        assert_eq!(Reply::parse(b"OK"), None);
        assert_eq!(Reply::parse(b"Battery voltage (mV): "), None);
        assert_eq!(Reply::parse(b"Battery voltage (mV): abc"), None);
        assert_eq!(Reply::parse(b"Battery voltage"), None);
        assert_eq!(Reply::parse(b"Temperature value (0.01 degC): -"), None);
        assert_eq!(Reply::parse(b" Battery voltage (mV): 3300"), None);
        assert_eq!(Reply::parse(&[0xff, 0xfe, 0x00]), None);
    }

    #[test]
    fn test_parse_int_overflow() {
        assert_eq!(
            parse_int(b"Battery voltage (mV): 99999999999999999999", BATTERY_VOLTAGE_PREFIX),
            None
        );
    }

    #[test]
    fn test_parse_int_trailing_text() {
        assert_eq!(
            parse_int(b"Battery voltage (mV): 42 extra", BATTERY_VOLTAGE_PREFIX),
            Some(42)
        );
    }

    proptest! {
        #[test]
        fn prop_battery_roundtrip(n in any::<i32>()) {
            let payload = format!("Battery voltage (mV): {}", n);
            prop_assert_eq!(Reply::parse(payload.as_bytes()), Some(Reply::BatteryVoltage(n as i64)));
        }

        #[test]
        fn prop_temperature_roundtrip(n in -100_000i64..100_000) {
            let payload = format!("Temperature value (0.01 degC): {}\n", n);
            prop_assert_eq!(Reply::parse(payload.as_bytes()), Some(Reply::Temperature(n)));
        }

        #[test]
        fn prop_other_text_never_matches(text in "[^BT].*") {
            prop_assert_eq!(Reply::parse(text.as_bytes()), None);
        }
    }
}
