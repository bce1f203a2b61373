//! Metrics sink.
//!
//! Acquisition cycles report values through the [`MetricsSink`] trait. The
//! production sink is a [`GaugeRegistry`]: an in-memory set of gauges keyed by
//! device labels that renders the Prometheus text exposition format.
//!
//! # Metrics
//!
//! - `ble_sensor_last_connection_time_s` - time taken by the last connect
//! - `battery_mv` - battery voltage in millivolts
//! - `temperature_f` - temperature in degrees Fahrenheit
//!
//! All carry the `address`, `name` and `display_name` labels.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use parking_lot::RwLock;

/// Connection latency gauge name.
pub const CONNECTION_TIME_METRIC: &str = "ble_sensor_last_connection_time_s";
/// Battery voltage gauge name.
pub const BATTERY_METRIC: &str = "battery_mv";
/// Temperature gauge name.
pub const TEMPERATURE_METRIC: &str = "temperature_f";

/// The label set identifying one device's gauges.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceLabels {
    /// Device address.
    pub address: String,
    /// Logical device name.
    pub name: String,
    /// Human label, may be empty.
    pub display_name: String,
}

impl DeviceLabels {
    /// Create a label set.
    pub fn new(address: &str, name: &str, display_name: &str) -> Self {
        Self {
            address: address.to_string(),
            name: name.to_string(),
            display_name: display_name.to_string(),
        }
    }

    /// Render as a Prometheus label list (without braces).
    fn render(&self) -> String {
        format!(
            "address=\"{}\",name=\"{}\",display_name=\"{}\"",
            escape_label_value(&self.address),
            escape_label_value(&self.name),
            escape_label_value(&self.display_name)
        )
    }
}

/// Receiver of per-device measurements.
///
/// Every setter overwrites the previous value for the same labels.
/// Implementations are called from notification handling and must not block.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    /// Record how long the last connection took to establish.
    fn set_connection_latency(&self, labels: &DeviceLabels, seconds: f64);

    /// Record a battery voltage.
    fn set_battery_millivolts(&self, labels: &DeviceLabels, millivolts: i64);

    /// Record a temperature.
    fn set_temperature_fahrenheit(&self, labels: &DeviceLabels, fahrenheit: f64);
}

/// Latest values for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceGauges {
    /// Last connection latency in seconds.
    pub connection_latency_seconds: Option<f64>,
    /// Last battery voltage in millivolts.
    pub battery_millivolts: Option<f64>,
    /// Last temperature in Fahrenheit.
    pub temperature_fahrenheit: Option<f64>,
}

impl DeviceGauges {
    fn connection_latency(&self) -> Option<f64> {
        self.connection_latency_seconds
    }

    fn battery(&self) -> Option<f64> {
        self.battery_millivolts
    }

    fn temperature(&self) -> Option<f64> {
        self.temperature_fahrenheit
    }
}

/// In-memory gauge registry.
#[derive(Debug, Default)]
pub struct GaugeRegistry {
    gauges: RwLock<BTreeMap<DeviceLabels, DeviceGauges>>,
}

impl GaugeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current values for `labels`, if anything was recorded.
    pub fn get(&self, labels: &DeviceLabels) -> Option<DeviceGauges> {
        self.gauges.read().get(labels).copied()
    }

    /// All label sets with at least one recorded value.
    pub fn labels(&self) -> Vec<DeviceLabels> {
        self.gauges.read().keys().cloned().collect()
    }

    fn update(&self, labels: &DeviceLabels, apply: impl FnOnce(&mut DeviceGauges)) {
        let mut gauges = self.gauges.write();
        match gauges.get_mut(labels) {
            Some(entry) => apply(entry),
            None => {
                let mut entry = DeviceGauges::default();
                apply(&mut entry);
                gauges.insert(labels.clone(), entry);
            }
        }
    }

    /// Render every gauge in Prometheus text format.
    pub fn render(&self) -> String {
        let gauges = self.gauges.read();
        let mut output = String::with_capacity(256 * (gauges.len() + 1));

        let families: [(&str, &str, fn(&DeviceGauges) -> Option<f64>); 3] = [
            (
                CONNECTION_TIME_METRIC,
                "Seconds taken to establish the last BLE connection",
                DeviceGauges::connection_latency,
            ),
            (
                BATTERY_METRIC,
                "Battery voltage in millivolts",
                DeviceGauges::battery,
            ),
            (
                TEMPERATURE_METRIC,
                "Temperature in degrees Fahrenheit",
                DeviceGauges::temperature,
            ),
        ];

        for (name, help, value) in families {
            let samples: Vec<_> = gauges
                .iter()
                .filter_map(|(labels, g)| value(g).map(|v| (labels, v)))
                .collect();
            if samples.is_empty() {
                continue;
            }

            let _ = writeln!(output, "# HELP {} {}", name, help);
            let _ = writeln!(output, "# TYPE {} gauge", name);
            for (labels, v) in samples {
                let _ = writeln!(output, "{}{{{}}} {}", name, labels.render(), v);
            }
        }

        output
    }
}

impl MetricsSink for GaugeRegistry {
    fn set_connection_latency(&self, labels: &DeviceLabels, seconds: f64) {
        self.update(labels, |g| g.connection_latency_seconds = Some(seconds));
    }

    fn set_battery_millivolts(&self, labels: &DeviceLabels, millivolts: i64) {
        self.update(labels, |g| g.battery_millivolts = Some(millivolts as f64));
    }

    fn set_temperature_fahrenheit(&self, labels: &DeviceLabels, fahrenheit: f64) {
        self.update(labels, |g| g.temperature_fahrenheit = Some(fahrenheit));
    }
}

/// Escape special characters in Prometheus label values.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn labels() -> DeviceLabels {
        DeviceLabels::new("AA:BB", "sensor1", "")
    }

    #[test]
    fn test_last_value_wins() {
        let registry = GaugeRegistry::new();
        registry.set_battery_millivolts(&labels(), 3300);
        registry.set_battery_millivolts(&labels(), 3100);

        let gauges = registry.get(&labels()).unwrap();
        assert_eq!(gauges.battery_millivolts, Some(3100.0));
        assert_eq!(gauges.temperature_fahrenheit, None);
    }

    #[test]
    fn test_labels_are_independent() {
        let registry = GaugeRegistry::new();
        let other = DeviceLabels::new("CC:DD", "sensor2", "Garage");

        registry.set_temperature_fahrenheit(&labels(), 77.0);
        registry.set_temperature_fahrenheit(&other, 50.0);

        assert_eq!(registry.get(&labels()).unwrap().temperature_fahrenheit, Some(77.0));
        assert_eq!(registry.get(&other).unwrap().temperature_fahrenheit, Some(50.0));
        assert_eq!(registry.labels().len(), 2);
    }

    #[test]
    fn test_render() {
        let registry = GaugeRegistry::new();
        registry.set_connection_latency(&labels(), 0.5);
        registry.set_battery_millivolts(&labels(), 3300);
        registry.set_temperature_fahrenheit(&labels(), 77.25);

        let expected = "\
# HELP ble_sensor_last_connection_time_s Seconds taken to establish the last BLE connection
# TYPE ble_sensor_last_connection_time_s gauge
ble_sensor_last_connection_time_s{address=\"AA:BB\",name=\"sensor1\",display_name=\"\"} 0.5
# HELP battery_mv Battery voltage in millivolts
# TYPE battery_mv gauge
battery_mv{address=\"AA:BB\",name=\"sensor1\",display_name=\"\"} 3300
# HELP temperature_f Temperature in degrees Fahrenheit
# TYPE temperature_f gauge
temperature_f{address=\"AA:BB\",name=\"sensor1\",display_name=\"\"} 77.25
";
        assert_eq!(registry.render(), expected);
    }

    #[test]
    fn test_render_skips_empty_families() {
        let registry = GaugeRegistry::new();
        assert_eq!(registry.render(), "");

        registry.set_connection_latency(&labels(), 1.0);
        let output = registry.render();
        assert!(output.contains(CONNECTION_TIME_METRIC));
        assert!(!output.contains(BATTERY_METRIC));
        assert!(!output.contains(TEMPERATURE_METRIC));
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_label_value("x\ny"), "x\\ny");
        let labels = DeviceLabels::new("AA", "n", "Living \"room\"");
        assert!(labels.render().contains(r#"display_name="Living \"room\"""#));
    }
}
