//! GATT characteristic handling.
//!
//! Provides service discovery, subscription and writes on top of a btleplug
//! peripheral, caching the discovered characteristics by UUID.

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use bytes::Bytes;
use futures::future;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::ble::transport::{GattCharacteristic, GattService, NotificationStream};
use crate::error::{Error, Result};

/// Handler for GATT characteristics on a connected peripheral.
pub struct CharacteristicHandler {
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// Cached characteristics by UUID.
    characteristics: RwLock<HashMap<Uuid, Characteristic>>,
}

impl CharacteristicHandler {
    /// Create a new characteristic handler for a connected peripheral.
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: RwLock::new(HashMap::new()),
        }
    }

    /// Discover services matching `filter` (all when empty) and cache their characteristics.
    pub async fn discover(&self, filter: &[Uuid]) -> Result<Vec<GattService>> {
        self.peripheral.discover_services().await?;

        let mut cache = self.characteristics.write();
        let mut services = Vec::new();

        for service in self.peripheral.services() {
            if !filter.is_empty() && !filter.contains(&service.uuid) {
                continue;
            }

            let mut characteristics = Vec::with_capacity(service.characteristics.len());
            for characteristic in service.characteristics {
                debug!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid, service.uuid
                );
                characteristics.push(GattCharacteristic {
                    uuid: characteristic.uuid,
                    service_uuid: characteristic.service_uuid,
                });
                cache.insert(characteristic.uuid, characteristic);
            }

            services.push(GattService {
                uuid: service.uuid,
                characteristics,
            });
        }

        debug!(
            "Discovered {} services, {} characteristics cached",
            services.len(),
            cache.len()
        );

        Ok(services)
    }

    /// Get a cached characteristic by UUID.
    fn get(&self, uuid: &Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }

    /// Subscribe to notifications from a characteristic.
    ///
    /// The peripheral's notification stream is opened before subscribing so
    /// that nothing sent right after the subscription is lost.
    pub async fn subscribe(&self, uuid: &Uuid) -> Result<NotificationStream> {
        let characteristic = self.get(uuid)?;

        debug!(
            "Subscribing to {}, properties: {:?}",
            uuid, characteristic.properties
        );

        let notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&characteristic).await?;

        let wanted = *uuid;
        let stream = notifications.filter_map(move |notification| {
            let payload = (notification.uuid == wanted).then(|| {
                trace!(
                    "Notification from {}: {:02X?}",
                    notification.uuid,
                    notification.value
                );
                Bytes::from(notification.value)
            });
            future::ready(payload)
        });

        debug!("Subscribed to notifications from {}", uuid);

        Ok(Box::pin(stream))
    }

    /// Write to a characteristic without requesting an acknowledgement.
    pub async fn write_without_response(&self, uuid: &Uuid, data: &[u8]) -> Result<()> {
        let characteristic = self.get(uuid)?;

        self.peripheral
            .write(&characteristic, data, WriteType::WithoutResponse)
            .await?;

        trace!("Wrote {} bytes to characteristic {}", data.len(), uuid);

        Ok(())
    }
}
