//! Configuration file loading.
//!
//! The configuration is a YAML document listing the devices to poll plus a
//! few process-wide settings. Durations are written in human form (`2s`,
//! `1m`, `100ms`).
//!
//! ```yaml
//! listen: "0.0.0.0:9090"
//! scan_prefix: "C T"
//! timing:
//!   collection_window: 1s
//! devices:
//!   - name: sensor1
//!     address: "AA:BB:CC:DD:EE:FF"
//!     display_name: Kitchen
//!     frequency: 2s
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::metrics::DeviceLabels;

/// Default address of the metrics endpoint.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:9090";

/// Default advertised-name prefix reported by discovery.
pub const DEFAULT_SCAN_PREFIX: &str = "C T";

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between consecutive commands.
pub const DEFAULT_COMMAND_PACING: Duration = Duration::from_millis(100);

/// Default time to wait for replies after the last command.
pub const DEFAULT_COLLECTION_WINDOW: Duration = Duration::from_secs(1);

/// Default poll interval for devices that do not set one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_scan_prefix() -> String {
    DEFAULT_SCAN_PREFIX.to_string()
}

/// One configured device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Logical name, used as a metric label and in logs. May be empty.
    #[serde(default)]
    pub name: String,

    /// Link-layer address (or platform identifier) of the device.
    pub address: String,

    /// Human label exported as a metric label only.
    #[serde(default)]
    pub display_name: String,

    /// Name the device advertised before it was renamed. Informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,

    /// Poll interval; absent or zero means the default interval.
    #[serde(
        default,
        rename = "frequency",
        alias = "poll_interval",
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub poll_interval: Option<Duration>,
}

impl DeviceDescriptor {
    /// Create a descriptor with no display name and the default interval.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            display_name: String::new(),
            original_name: None,
            poll_interval: None,
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the display name.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// The configured interval, or `default` when unset or zero.
    pub fn poll_interval_or(&self, default: Duration) -> Duration {
        match self.poll_interval {
            Some(interval) if !interval.is_zero() => interval,
            _ => default,
        }
    }

    /// Metric labels for this device.
    pub fn labels(&self) -> DeviceLabels {
        DeviceLabels::new(&self.address, &self.name, &self.display_name)
    }
}

/// Protocol timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Time allowed to establish a connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Delay between consecutive commands.
    #[serde(with = "humantime_serde")]
    pub command_pacing: Duration,

    /// Time to wait for replies after the last command. Always waited in full.
    #[serde(with = "humantime_serde")]
    pub collection_window: Duration,

    /// Poll interval for devices without one.
    #[serde(with = "humantime_serde")]
    pub default_poll_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_pacing: DEFAULT_COMMAND_PACING,
            collection_window: DEFAULT_COLLECTION_WINDOW,
            default_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the metrics endpoint listens on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Advertised-name prefix reported by discovery.
    #[serde(default = "default_scan_prefix")]
    pub scan_prefix: String,

    /// Protocol timing.
    #[serde(default)]
    pub timing: Timing,

    /// Devices to poll.
    #[serde(default)]
    pub devices: Vec<DeviceDescriptor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            scan_prefix: default_scan_prefix(),
            timing: Timing::default(),
            devices: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Check that the configuration can drive the poller.
    ///
    /// Requires at least one device, a non-empty address unique
    /// (case-insensitively) per device, and non-zero connect timeout and
    /// default poll interval.
    pub fn validate_for_polling(&self) -> Result<()> {
        if self.timing.connect_timeout.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "timing.connect_timeout must be greater than zero".to_string(),
            });
        }
        if self.timing.default_poll_interval.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "timing.default_poll_interval must be greater than zero".to_string(),
            });
        }

        if self.devices.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "at least one device must be configured".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            let address = device.address.trim();
            if address.is_empty() {
                return Err(Error::InvalidConfig {
                    reason: format!("device '{}' has no address", device.name),
                });
            }
            if !seen.insert(address.to_ascii_uppercase()) {
                return Err(Error::InvalidConfig {
                    reason: format!("duplicate device address '{}'", address),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SAMPLE: &str = r#"
listen: "127.0.0.1:9191"
timing:
  collection_window: 2s
devices:
  - name: sensor1
    address: "AA:BB"
    display_name: Kitchen
    frequency: 2s
  - name: sensor2
    address: "CC:DD"
    original_name: "C T 0042"
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(config.listen, "127.0.0.1:9191".parse::<SocketAddr>().unwrap());
        assert_eq!(config.scan_prefix, DEFAULT_SCAN_PREFIX);
        assert_eq!(config.timing.collection_window, Duration::from_secs(2));
        assert_eq!(config.timing.command_pacing, DEFAULT_COMMAND_PACING);
        assert_eq!(config.timing.connect_timeout, DEFAULT_CONNECT_TIMEOUT);

        assert_eq!(
            config.devices,
            vec![
                DeviceDescriptor::new("sensor1", "AA:BB")
                    .with_display_name("Kitchen")
                    .with_poll_interval(Duration::from_secs(2)),
                DeviceDescriptor {
                    original_name: Some("C T 0042".to_string()),
                    ..DeviceDescriptor::new("sensor2", "CC:DD")
                },
            ]
        );
    }

    #[test]
    fn test_example_config() {
        let config = Config::from_yaml_str(include_str!("../config.example.yaml")).unwrap();
        assert_eq!(config.timing, Timing::default());
        assert_eq!(config.devices.len(), 2);
        assert!(config.validate_for_polling().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml_str("devices: []").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen.to_string(), DEFAULT_LISTEN);
    }

    #[test]
    fn test_poll_interval_alias() {
        let config = Config::from_yaml_str(
            "devices:\n  - name: a\n    address: x\n    poll_interval: 1m30s\n",
        )
        .unwrap();
        assert_eq!(config.devices[0].poll_interval, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_poll_interval_or_default() {
        let default = Duration::from_secs(60);
        let device = DeviceDescriptor::new("a", "x");
        assert_eq!(device.poll_interval_or(default), default);

        let device = device.with_poll_interval(Duration::ZERO);
        assert_eq!(device.poll_interval_or(default), default);

        let device = device.with_poll_interval(Duration::from_secs(2));
        assert_eq!(device.poll_interval_or(default), Duration::from_secs(2));
    }

    #[test]
    fn test_validate_for_polling() {
        let mut config = Config::default();
        assert!(matches!(
            config.validate_for_polling(),
            Err(Error::InvalidConfig { .. })
        ));

        config.devices.push(DeviceDescriptor::new("a", "aa:bb"));
        assert!(config.validate_for_polling().is_ok());

        config.devices.push(DeviceDescriptor::new("b", "AA:BB"));
        let err = config.validate_for_polling().unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        config.devices[1].address = "  ".to_string();
        let err = config.validate_for_polling().unwrap_err();
        assert!(err.to_string().contains("no address"));
    }

    #[test]
    fn test_zero_timing_rejected() {
        let config = Config::from_yaml_str(
            "timing:\n  default_poll_interval: 0s\ndevices:\n  - name: a\n    address: x\n",
        )
        .unwrap();
        let err = config.validate_for_polling().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(err.to_string().contains("default_poll_interval"));

        let config = Config::from_yaml_str(
            "timing:\n  connect_timeout: 0s\ndevices:\n  - name: a\n    address: x\n",
        )
        .unwrap();
        let err = config.validate_for_polling().unwrap_err();
        assert!(err.to_string().contains("connect_timeout"));
    }

    #[test]
    fn test_device_without_name() {
        let config = Config::from_yaml_str("devices:\n  - address: \"AA:BB\"\n").unwrap();
        assert_eq!(config.devices, vec![DeviceDescriptor::new("", "AA:BB")]);
        assert!(config.validate_for_polling().is_ok());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = Config::from_yaml_str("devices: [").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));

        let err = Config::from_yaml_str("devices:\n  - name: a\n    address: x\n    frequency: soon\n")
            .unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.devices.len(), 2);

        let err = Config::load(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
