//! Radio adapter boundary
//!
//! The platform BLE stack sits behind [`RadioAdapter`]. Primitives are issued
//! by the link task; their outcomes (apart from writes, which are awaited
//! directly) come back as [`RadioEvent`]s on the channel handed to
//! [`MirrorLink`](crate::MirrorLink).

use std::fmt::{self, Debug};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

// ----------------------------------------------------------------------------
// Adapter State
// ----------------------------------------------------------------------------

/// Power/authorization state reported by the platform adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterState {
    Unknown,
    PoweredOn,
    PoweredOff,
    Resetting,
    Unauthorized,
    Unsupported,
}

impl AdapterState {
    pub fn is_powered_on(&self) -> bool {
        matches!(self, AdapterState::PoweredOn)
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterState::Unknown => "Unknown",
            AdapterState::PoweredOn => "PoweredOn",
            AdapterState::PoweredOff => "PoweredOff",
            AdapterState::Resetting => "Resetting",
            AdapterState::Unauthorized => "Unauthorized",
            AdapterState::Unsupported => "Unsupported",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Sightings and Discovery Results
// ----------------------------------------------------------------------------

/// A nearby device seen while scanning
#[derive(Debug, Clone, PartialEq)]
pub struct Advertiser<P> {
    pub peripheral: P,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

impl<P> Advertiser<P> {
    /// The advertised name, if present and non-empty
    pub fn usable_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}

/// A service or characteristic handle paired with its identifier
#[derive(Debug, Clone, PartialEq)]
pub struct Discovered<T> {
    pub uuid: Uuid,
    pub handle: T,
}

impl<T> Discovered<T> {
    pub fn new(uuid: Uuid, handle: T) -> Self {
        Self { uuid, handle }
    }
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Notifications delivered by the radio adapter, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent<P, S, C> {
    AdapterStateChanged(AdapterState),
    AdvertiserSighted(Advertiser<P>),
    Connected(P),
    Disconnected {
        peripheral: P,
        reason: Option<String>,
    },
    ServicesDiscovered {
        peripheral: P,
        services: Vec<Discovered<S>>,
        error: Option<String>,
    },
    CharacteristicsDiscovered {
        service: S,
        characteristics: Vec<Discovered<C>>,
        error: Option<String>,
    },
}

/// Event type produced by a given adapter
pub type AdapterEvent<A> = RadioEvent<
    <A as RadioAdapter>::Peripheral,
    <A as RadioAdapter>::Service,
    <A as RadioAdapter>::Characteristic,
>;

// ----------------------------------------------------------------------------
// Adapter Trait
// ----------------------------------------------------------------------------

/// Central-role primitives offered by the platform BLE stack
#[async_trait]
pub trait RadioAdapter: Send + Sync + 'static {
    type Peripheral: Clone + Debug + PartialEq + Send + Sync + 'static;
    type Service: Clone + Debug + PartialEq + Send + Sync + 'static;
    type Characteristic: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Start scanning; `None` scans for every advertiser
    async fn scan(&self, service_filter: Option<Uuid>) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    /// Request a connection. Completion arrives as [`RadioEvent::Connected`]
    /// or [`RadioEvent::Disconnected`].
    async fn connect(&self, peripheral: &Self::Peripheral) -> Result<()>;

    /// Tear the link down without waiting for the platform. Completion
    /// arrives as [`RadioEvent::Disconnected`].
    async fn cancel_connection(&self, peripheral: &Self::Peripheral) -> Result<()>;

    /// Answered with [`RadioEvent::ServicesDiscovered`]
    async fn discover_services(&self, peripheral: &Self::Peripheral, ids: &[Uuid]) -> Result<()>;

    /// Answered with [`RadioEvent::CharacteristicsDiscovered`]
    async fn discover_characteristics(&self, service: &Self::Service, ids: &[Uuid]) -> Result<()>;

    /// Write a value; with `ack_required` this resolves once the peripheral
    /// acknowledged the write
    async fn write_value(
        &self,
        peripheral: &Self::Peripheral,
        characteristic: &Self::Characteristic,
        bytes: &[u8],
        ack_required: bool,
    ) -> Result<()>;
}
