//! Central event translation and GATT selection
//!
//! btleplug reports everything through one `CentralEvent` stream keyed by
//! peripheral id. The pump here resolves ids to peripherals and forwards the
//! events the mirror link cares about as [`RadioEvent`]s.

use std::pin::Pin;

use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Peripheral as _, Service,
};
use btleplug::platform::{Adapter, PeripheralId};
use futures::stream::{Stream, StreamExt};
use mirrorlink_core::{AdapterState, Advertiser, Discovered, RadioEvent};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::peripheral::BlePeripheral;

/// Radio event carrying btleplug handles
pub type BleEvent = RadioEvent<BlePeripheral, Service, Characteristic>;

pub(crate) type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

// ----------------------------------------------------------------------------
// Adapter State
// ----------------------------------------------------------------------------

pub fn map_central_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        CentralState::Unknown => AdapterState::Unknown,
    }
}

// ----------------------------------------------------------------------------
// Event Pump
// ----------------------------------------------------------------------------

/// Forward central events until the stream ends or the link goes away
pub(crate) async fn pump_events(
    adapter: Adapter,
    mut events: CentralEvents,
    tx: mpsc::UnboundedSender<BleEvent>,
) {
    while let Some(event) = events.next().await {
        let translated = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                sighting(&adapter, &id).await
            }
            CentralEvent::DeviceDisconnected(id) => match adapter.peripheral(&id).await {
                Ok(peripheral) => Some(RadioEvent::Disconnected {
                    peripheral: BlePeripheral::new(peripheral),
                    reason: None,
                }),
                Err(e) => {
                    debug!("Disconnect for unknown peripheral {:?}: {}", id, e);
                    None
                }
            },
            CentralEvent::StateUpdate(state) => {
                let state = map_central_state(state);
                info!("BLE adapter state changed: {}", state);
                Some(RadioEvent::AdapterStateChanged(state))
            }
            _ => None,
        };

        if let Some(event) = translated {
            if tx.send(event).is_err() {
                debug!("Mirror link gone, stopping BLE event pump");
                return;
            }
        }
    }
    debug!("BLE central event stream ended");
}

async fn sighting(adapter: &Adapter, id: &PeripheralId) -> Option<BleEvent> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let properties = peripheral.properties().await.ok().flatten()?;
    Some(RadioEvent::AdvertiserSighted(Advertiser {
        peripheral: BlePeripheral::new(peripheral),
        name: properties.local_name,
        rssi: properties.rssi,
    }))
}

// ----------------------------------------------------------------------------
// GATT Selection
// ----------------------------------------------------------------------------

/// Services matching `ids`; an empty id list keeps everything
pub fn select_services(
    services: impl IntoIterator<Item = Service>,
    ids: &[Uuid],
) -> Vec<Discovered<Service>> {
    services
        .into_iter()
        .filter(|service| ids.is_empty() || ids.contains(&service.uuid))
        .map(|service| Discovered::new(service.uuid, service))
        .collect()
}

/// Characteristics of `service` matching `ids`
pub fn select_characteristics(service: &Service, ids: &[Uuid]) -> Vec<Discovered<Characteristic>> {
    service
        .characteristics
        .iter()
        .filter(|c| ids.is_empty() || ids.contains(&c.uuid))
        .map(|c| Discovered::new(c.uuid, c.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use btleplug::api::CharPropFlags;
    use mirrorlink_core::{MIRROR_COMMAND_CHARACTERISTIC_UUID, MIRROR_SERVICE_UUID};
    use std::collections::BTreeSet;

    fn characteristic(uuid: Uuid, service_uuid: Uuid) -> Characteristic {
        Characteristic {
            uuid,
            service_uuid,
            properties: CharPropFlags::WRITE,
            descriptors: BTreeSet::new(),
        }
    }

    fn mirror_service() -> Service {
        let mut characteristics = BTreeSet::new();
        characteristics.insert(characteristic(
            MIRROR_COMMAND_CHARACTERISTIC_UUID,
            MIRROR_SERVICE_UUID,
        ));
        characteristics.insert(characteristic(Uuid::from_u128(0x2a00), MIRROR_SERVICE_UUID));
        Service {
            uuid: MIRROR_SERVICE_UUID,
            primary: true,
            characteristics,
        }
    }

    #[test]
    fn test_central_state_mapping() {
        assert_eq!(map_central_state(CentralState::PoweredOn), AdapterState::PoweredOn);
        assert_eq!(map_central_state(CentralState::PoweredOff), AdapterState::PoweredOff);
        assert_eq!(map_central_state(CentralState::Unknown), AdapterState::Unknown);
    }

    #[test]
    fn test_select_services_by_id() {
        let battery = Service {
            uuid: Uuid::from_u128(0x180f),
            primary: true,
            characteristics: BTreeSet::new(),
        };
        let selected = select_services(vec![battery, mirror_service()], &[MIRROR_SERVICE_UUID]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].uuid, MIRROR_SERVICE_UUID);
    }

    #[test]
    fn test_select_command_characteristic() {
        let selected =
            select_characteristics(&mirror_service(), &[MIRROR_COMMAND_CHARACTERISTIC_UUID]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].handle.uuid, MIRROR_COMMAND_CHARACTERISTIC_UUID);

        assert_eq!(select_characteristics(&mirror_service(), &[]).len(), 2);
    }
}
