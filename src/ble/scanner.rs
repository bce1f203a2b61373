//! BLE advertisement observation.
//!
//! Turns the adapter's central events into a stream of [`Advertisement`]s.

use btleplug::api::{BDAddr, Central, CentralEvent, Peripheral as _};
use btleplug::platform::{Adapter, PeripheralId};
use futures::stream::StreamExt;
use tracing::{debug, trace};

use crate::ble::transport::{Advertisement, AdvertisementStream};
use crate::error::Result;

/// Subscribe to the adapter's events and map them to advertisements.
///
/// Only discovery and update events for peripherals that advertise a local
/// name are forwarded.
pub(crate) async fn advertisement_stream(adapter: Adapter) -> Result<AdvertisementStream> {
    let events = adapter.events().await?;

    let stream = events.filter_map(move |event| {
        let adapter = adapter.clone();
        async move { handle_event(event, &adapter).await }
    });

    Ok(Box::pin(stream))
}

/// Handle a BLE central event.
async fn handle_event(event: CentralEvent, adapter: &Adapter) -> Option<Advertisement> {
    match event {
        CentralEvent::DeviceDiscovered(id) => {
            trace!("Device discovered: {:?}", id);
            process_peripheral(adapter, id).await
        }
        CentralEvent::DeviceUpdated(id) => {
            trace!("Device updated: {:?}", id);
            process_peripheral(adapter, id).await
        }
        CentralEvent::DeviceConnected(id) => {
            debug!("Device connected: {:?}", id);
            None
        }
        CentralEvent::DeviceDisconnected(id) => {
            debug!("Device disconnected: {:?}", id);
            None
        }
        _ => None,
    }
}

/// Resolve a peripheral's advertised properties.
async fn process_peripheral(adapter: &Adapter, id: PeripheralId) -> Option<Advertisement> {
    let peripheral = match adapter.peripheral(&id).await {
        Ok(p) => p,
        Err(e) => {
            trace!("Failed to get peripheral: {}", e);
            return None;
        }
    };

    let properties = match peripheral.properties().await {
        Ok(Some(p)) => p,
        _ => return None,
    };

    let local_name = properties.local_name?;

    Some(Advertisement {
        address: display_address(&id, properties.address),
        local_name,
        rssi: properties.rssi,
    })
}

/// The address used to identify a peripheral.
///
/// Some platforms (macOS) hide the hardware address and report all zeros; the
/// platform identifier is used there instead.
pub(crate) fn display_address(id: &PeripheralId, address: BDAddr) -> String {
    if address == BDAddr::default() {
        id.to_string()
    } else {
        address.to_string()
    }
}
