// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # ble-sensor-exporter
//!
//! Polls Bluetooth Low Energy sensors that speak a line-oriented command
//! protocol over the Nordic UART service, and exports their battery voltage
//! and temperature as Prometheus gauges.
//!
//! ## Features
//!
//! - **Polling**: one independent loop per configured device, each running a
//!   connect / command / collect / disconnect cycle on its own interval
//! - **Failure isolation**: a device that fails only misses its own readings
//!   until its next tick
//! - **Metrics**: `battery_mv`, `temperature_f` and
//!   `ble_sensor_last_connection_time_s` served on `/metrics`
//! - **Discovery**: list nearby devices whose advertised name has a prefix
//! - **Console**: send raw commands to one device and print its replies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ble_sensor_exporter::{Acquirer, BtleplugTransport, Config, GaugeRegistry, Poller, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     config.validate_for_polling()?;
//!
//!     let registry = Arc::new(GaugeRegistry::new());
//!     let transport = Arc::new(BtleplugTransport::enable().await?);
//!     let poller = Poller::new(Acquirer::new(transport, registry.clone(), config.timing));
//!
//!     let handles = poller.spawn(config.devices.clone());
//!     tokio::signal::ctrl_c().await?;
//!     poller.shutdown();
//!     for handle in handles {
//!         let _ = handle.await;
//!     }
//!
//!     print!("{}", registry.render());
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Devices are identified by a platform UUID
//! rather than their hardware address; use that identifier in the config.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.

pub mod acquisition;
pub mod ble;
pub mod config;
pub mod discovery;
pub mod error;
pub mod interactive;
pub mod metrics;
pub mod mock;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod utils;

// Re-exports for convenience
pub use acquisition::{Acquirer, Acquisition, CycleError, CycleStage, Readings};
pub use ble::{BleConnection, BleTransport, BtleplugTransport, UartChannel};
pub use config::{Config, DeviceDescriptor, Timing};
pub use discovery::{Discovered, DiscoveryScanner};
pub use error::{Error, Result};
pub use metrics::{DeviceLabels, GaugeRegistry, MetricsSink};
pub use protocol::{Command, Reply};
pub use scheduler::Poller;
pub use utils::centi_celsius_to_fahrenheit;
