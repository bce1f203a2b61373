//! BLE communication module.
//!
//! The transport traits the rest of the crate is written against, and their
//! btleplug implementation.

pub mod adapter;
pub mod characteristics;
pub mod connection;
pub mod scanner;
pub mod transport;
pub mod uart;
pub mod uuids;

pub use adapter::BtleplugTransport;
pub use connection::PeripheralConnection;
pub use transport::{
    Advertisement, AdvertisementStream, BleConnection, BleTransport, GattCharacteristic,
    GattService, NotificationStream,
};
pub use uart::UartChannel;
pub use uuids::*;
