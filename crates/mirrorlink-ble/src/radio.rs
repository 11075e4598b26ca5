//! btleplug implementation of the mirror radio adapter

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service, WriteType,
};
use btleplug::platform::{Adapter, Manager};
use mirrorlink_core::{AdapterState, RadioAdapter, RadioEvent, Result as MirrorResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::discovery::{
    map_central_state, pump_events, select_characteristics, select_services, BleEvent,
};
use crate::error::BleRadioError;
use crate::peripheral::BlePeripheral;

// ----------------------------------------------------------------------------
// Radio Implementation
// ----------------------------------------------------------------------------

/// Central-role radio over the first platform BLE adapter
pub struct BtleplugRadio {
    adapter: Adapter,
    events: mpsc::UnboundedSender<BleEvent>,
    pump: JoinHandle<()>,
}

impl BtleplugRadio {
    /// Open the first BLE adapter and start forwarding its events
    pub async fn new() -> Result<(Self, mpsc::UnboundedReceiver<BleEvent>), BleRadioError> {
        let manager = Manager::new()
            .await
            .map_err(|e| BleRadioError::ManagerFailed(e.to_string()))?;

        let adapter = manager
            .adapters()
            .await
            .map_err(|e| BleRadioError::ManagerFailed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or(BleRadioError::AdapterNotAvailable)?;

        Self::with_adapter(adapter).await
    }

    pub async fn with_adapter(
        adapter: Adapter,
    ) -> Result<(Self, mpsc::UnboundedReceiver<BleEvent>), BleRadioError> {
        let central_events = adapter
            .events()
            .await
            .map_err(|e| BleRadioError::EventStreamFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();

        // Later changes arrive as StateUpdate events
        let initial = match adapter.adapter_state().await {
            Ok(state) => map_central_state(state),
            Err(e) => {
                warn!("Failed to read BLE adapter state: {}", e);
                AdapterState::Unknown
            }
        };
        info!("BLE adapter initialized ({})", initial);
        let _ = tx.send(RadioEvent::AdapterStateChanged(initial));

        let pump = tokio::spawn(pump_events(adapter.clone(), central_events, tx.clone()));

        Ok((
            Self {
                adapter,
                events: tx,
                pump,
            },
            rx,
        ))
    }

    fn emit(&self, event: BleEvent) {
        if self.events.send(event).is_err() {
            debug!("Mirror link gone, dropping BLE event");
        }
    }
}

impl Drop for BtleplugRadio {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[async_trait]
impl RadioAdapter for BtleplugRadio {
    type Peripheral = BlePeripheral;
    type Service = Service;
    type Characteristic = Characteristic;

    async fn scan(&self, service_filter: Option<Uuid>) -> MirrorResult<()> {
        let filter = ScanFilter {
            services: service_filter.into_iter().collect(),
        };
        self.adapter
            .start_scan(filter)
            .await
            .map_err(|e| BleRadioError::ScanFailed(e.to_string()))?;
        info!("Started BLE scanning");
        Ok(())
    }

    async fn stop_scan(&self) -> MirrorResult<()> {
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| BleRadioError::ScanFailed(e.to_string()))?;
        debug!("Stopped BLE scanning");
        Ok(())
    }

    async fn connect(&self, peripheral: &BlePeripheral) -> MirrorResult<()> {
        let peripheral = peripheral.clone();
        let events = self.events.clone();

        // btleplug's connect resolves only when the link is up
        tokio::spawn(async move {
            let result = peripheral.platform().connect().await;
            let event = match result {
                Ok(()) => RadioEvent::Connected(peripheral),
                Err(e) => RadioEvent::Disconnected {
                    peripheral,
                    reason: Some(BleRadioError::ConnectionFailed(e.to_string()).to_string()),
                },
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    async fn cancel_connection(&self, peripheral: &BlePeripheral) -> MirrorResult<()> {
        let peripheral = peripheral.clone();
        let events = self.events.clone();

        // Platform teardown can take seconds; report it as an event
        tokio::spawn(async move {
            let result = peripheral.platform().disconnect().await;
            let reason = match result {
                Ok(()) => None,
                Err(e) => {
                    let e = BleRadioError::DisconnectFailed(e.to_string());
                    warn!("{}", e);
                    Some(e.to_string())
                }
            };
            let _ = events.send(RadioEvent::Disconnected { peripheral, reason });
        });
        Ok(())
    }

    async fn discover_services(
        &self,
        peripheral: &BlePeripheral,
        ids: &[Uuid],
    ) -> MirrorResult<()> {
        let peripheral = peripheral.clone();
        let events = self.events.clone();
        let ids = ids.to_vec();

        tokio::spawn(async move {
            let result = peripheral.platform().discover_services().await;
            let event = match result {
                Ok(()) => {
                    let services = select_services(peripheral.platform().services(), &ids);
                    RadioEvent::ServicesDiscovered {
                        peripheral,
                        services,
                        error: None,
                    }
                }
                Err(e) => RadioEvent::ServicesDiscovered {
                    peripheral,
                    services: Vec::new(),
                    error: Some(BleRadioError::ServiceDiscoveryFailed(e.to_string()).to_string()),
                },
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    async fn discover_characteristics(&self, service: &Service, ids: &[Uuid]) -> MirrorResult<()> {
        // Characteristics are resolved together with their service
        self.emit(RadioEvent::CharacteristicsDiscovered {
            service: service.clone(),
            characteristics: select_characteristics(service, ids),
            error: None,
        });
        Ok(())
    }

    async fn write_value(
        &self,
        peripheral: &BlePeripheral,
        characteristic: &Characteristic,
        bytes: &[u8],
        ack_required: bool,
    ) -> MirrorResult<()> {
        let write_type = if ack_required {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        peripheral
            .platform()
            .write(characteristic, bytes, write_type)
            .await
            .map_err(|e| BleRadioError::WriteFailed(e.to_string()))?;
        Ok(())
    }
}
