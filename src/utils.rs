//! Utility functions for the ble-sensor-exporter crate.

/// Convert a temperature reported in hundredths of a degree Celsius to
/// degrees Fahrenheit.
///
/// The sensors report `0.01 degC` units, so the usual `* 9 / 5 + 32` is
/// folded together with the `0.01` scale into a single `0.018` factor.
///
/// # Example
///
/// ```
/// use ble_sensor_exporter::centi_celsius_to_fahrenheit;
///
/// let fahrenheit = centi_celsius_to_fahrenheit(10_000);
/// assert!((fahrenheit - 212.0).abs() < 0.001);
/// ```
#[inline]
pub fn centi_celsius_to_fahrenheit(centi_celsius: i64) -> f64 {
    centi_celsius as f64 * 0.018 + 32.0
}

/// Render bytes as contiguous upper-case hex, e.g. `4F4B`.
pub fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centi_celsius_to_fahrenheit() {
        assert!((centi_celsius_to_fahrenheit(0) - 32.0).abs() < 1e-9);
        assert!((centi_celsius_to_fahrenheit(10_000) - 212.0).abs() < 1e-9);
        assert!((centi_celsius_to_fahrenheit(2_500) - 77.0).abs() < 1e-9);
        assert!((centi_celsius_to_fahrenheit(-4_000) - (-40.0)).abs() < 1e-9);
    }

    #[test]
    fn test_hex_upper() {
        assert_eq!(hex_upper(b"OK"), "4F4B");
        assert_eq!(hex_upper(&[0x00, 0xab]), "00AB");
        assert_eq!(hex_upper(&[]), "");
    }
}
