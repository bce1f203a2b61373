//! Discovery scanner.
//!
//! Watches advertisements and reports each device whose advertised name
//! starts with a prefix, once per session.

use std::collections::HashSet;
use std::fmt;

use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::ble::transport::{Advertisement, BleTransport};
use crate::error::Result;

/// A device reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    /// Device address.
    pub address: String,
    /// Signal strength, if the platform reported one.
    pub rssi: Option<i16>,
    /// Advertised local name.
    pub name: String,
}

impl fmt::Display for Discovered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "found device: {} ", self.address)?;
        match self.rssi {
            Some(rssi) => write!(f, "{}", rssi)?,
            None => write!(f, "--")?,
        }
        write!(f, " {}", self.name)
    }
}

/// Session state for one scan.
///
/// The seen set is behind a lock so advertisements may be fed from several
/// tasks at once.
#[derive(Debug)]
pub struct DiscoveryScanner {
    prefix: String,
    seen: Mutex<HashSet<String>>,
}

impl DiscoveryScanner {
    /// Create a scanner reporting names that start with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Number of distinct addresses seen so far, reported or not.
    pub fn seen_count(&self) -> usize {
        self.seen.lock().len()
    }

    /// Process one advertisement.
    ///
    /// Returns the device the first time its address is seen with a
    /// matching name. Every address is marked seen on first sight, so a
    /// device that later changes its name is still not reported.
    pub fn observe(&self, advertisement: &Advertisement) -> Option<Discovered> {
        if !self.seen.lock().insert(advertisement.address.clone()) {
            trace!("Ignoring repeat advertisement from {}", advertisement.address);
            return None;
        }

        if !advertisement.local_name.starts_with(&self.prefix) {
            debug!(
                "Skipping {} ({:?}): name does not match prefix",
                advertisement.address, advertisement.local_name
            );
            return None;
        }

        Some(Discovered {
            address: advertisement.address.clone(),
            rssi: advertisement.rssi,
            name: advertisement.local_name.clone(),
        })
    }

    /// Observe advertisements until the stream ends, calling `report` for
    /// each newly discovered device.
    ///
    /// With a live adapter the stream never ends; the caller stops the scan
    /// by dropping this future.
    pub async fn run<F>(&self, transport: &dyn BleTransport, mut report: F) -> Result<()>
    where
        F: FnMut(&Discovered),
    {
        info!("Scanning for devices with name prefix {:?}", self.prefix);
        let mut advertisements = transport.advertisements().await?;

        while let Some(advertisement) = advertisements.next().await {
            if let Some(device) = self.observe(&advertisement) {
                report(&device);
            }
        }

        debug!("Advertisement stream ended");
        Ok(())
    }
}
