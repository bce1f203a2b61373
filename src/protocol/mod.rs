//! Protocol module for the sensor's line-oriented UART command set.
//!
//! This module contains:
//! - The request commands written to the device
//! - Parsing of the text replies it notifies back

pub mod commands;
pub mod response;

pub use commands::Command;
pub use response::{parse_int, Reply};
