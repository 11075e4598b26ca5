//! Connection State Machine
//!
//! A pure transition function over [`Input`]s. Every radio event, timer firing
//! and caller request for one link goes through [`ConnectionMachine::handle`],
//! which updates the state and returns the [`Action`]s the owner must carry
//! out against the radio adapter. The machine never performs I/O itself.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::radio::{AdapterState, Advertiser, Discovered, RadioEvent};
use crate::selector::PeripheralSelector;

// ----------------------------------------------------------------------------
// Connection State Types
// ----------------------------------------------------------------------------

/// Lifecycle of the link to the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Radio is not powered on
    Idle,
    /// Looking for the mirror among nearby advertisers
    Scanning,
    /// Mirror found and bound, not connected
    Discovered,
    /// Connect request issued, waiting for the link
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    /// Command characteristic resolved; writes are permitted
    Ready,
    Disconnected,
    /// Last connect attempt timed out or failed
    Failed,
}

impl ConnectionState {
    /// Get current state name for logging
    pub fn state_name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Scanning => "Scanning",
            ConnectionState::Discovered => "Discovered",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::DiscoveringServices => "DiscoveringServices",
            ConnectionState::DiscoveringCharacteristics => "DiscoveringCharacteristics",
            ConnectionState::Ready => "Ready",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Failed => "Failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

/// Resolution of the command service and characteristic
#[derive(Debug, Clone, PartialEq)]
pub enum Binding<S, C> {
    Unbound,
    ServiceOnly { service: S },
    FullyBound { service: S, characteristic: C },
}

impl<S, C> Binding<S, C> {
    pub fn is_fully_bound(&self) -> bool {
        matches!(self, Binding::FullyBound { .. })
    }
}

/// Read-only view of the link for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub adapter: AdapterState,
    pub connected: bool,
    pub target_found: bool,
    pub most_recent_advertiser: Option<String>,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            adapter: AdapterState::Unknown,
            connected: false,
            target_found: false,
            most_recent_advertiser: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Inputs and Actions
// ----------------------------------------------------------------------------

/// Everything that can drive a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Input<P, S, C> {
    Radio(RadioEvent<P, S, C>),
    /// Caller wants the link; resolved exactly once via [`Action::ResolveConnect`]
    ConnectRequested { ticket: u64 },
    /// Timer armed by [`Action::ArmConnectTimeout`] fired
    ConnectTimedOut { ticket: u64 },
    DisconnectRequested,
}

/// Work the owner of the machine must perform
#[derive(Debug, Clone, PartialEq)]
pub enum Action<P, S> {
    StartScan { service_filter: Option<Uuid> },
    StopScan,
    Connect(P),
    CancelConnection(P),
    DiscoverServices { peripheral: P, ids: Vec<Uuid> },
    DiscoverCharacteristics { service: S, ids: Vec<Uuid> },
    ArmConnectTimeout { ticket: u64, after: Duration },
    ResolveConnect { ticket: u64, outcome: Result<()> },
}

// ----------------------------------------------------------------------------
// State Machine Implementation
// ----------------------------------------------------------------------------

/// Connection state machine for the single mirror peripheral
#[derive(Debug, Clone)]
pub struct ConnectionMachine<P, S, C> {
    state: ConnectionState,
    adapter: AdapterState,
    selector: PeripheralSelector,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
    connect_timeout: Duration,
    target: Option<P>,
    binding: Binding<S, C>,
    connected: bool,
    pending_connect: Option<u64>,
}

impl<P, S, C> ConnectionMachine<P, S, C>
where
    P: Clone + fmt::Debug + PartialEq,
    S: Clone + fmt::Debug + PartialEq,
    C: Clone + fmt::Debug,
{
    pub fn new(config: &MirrorConfig) -> Self {
        Self {
            state: ConnectionState::Idle,
            adapter: AdapterState::Unknown,
            selector: PeripheralSelector::new(config.target_name.clone()),
            service_uuid: config.service_uuid,
            characteristic_uuid: config.characteristic_uuid,
            connect_timeout: config.connect_timeout,
            target: None,
            binding: Binding::Unbound,
            connected: false,
            pending_connect: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.adapter
    }

    pub fn target(&self) -> Option<&P> {
        self.target.as_ref()
    }

    pub fn binding(&self) -> &Binding<S, C> {
        &self.binding
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn most_recent_advertiser(&self) -> Option<&str> {
        self.selector.most_recent()
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            state: self.state,
            adapter: self.adapter,
            connected: self.connected,
            target_found: self.target.is_some(),
            most_recent_advertiser: self.selector.most_recent().map(str::to_string),
        }
    }

    /// Peripheral and characteristic to write commands to
    ///
    /// Refuses unless the link is Ready with a fully resolved binding.
    pub fn write_target(&self) -> Result<(&P, &C)> {
        let target = self.target.as_ref().ok_or(MirrorError::NotConnected)?;
        if !self.connected {
            return Err(MirrorError::NotConnected);
        }
        match (&self.state, &self.binding) {
            (ConnectionState::Ready, Binding::FullyBound { characteristic, .. }) => {
                Ok((target, characteristic))
            }
            _ => Err(MirrorError::BindingIncomplete),
        }
    }

    /// Process an input and return the actions it requires
    pub fn handle(&mut self, input: Input<P, S, C>) -> Vec<Action<P, S>> {
        match input {
            Input::Radio(event) => self.on_radio_event(event),
            Input::ConnectRequested { ticket } => self.on_connect_requested(ticket),
            Input::ConnectTimedOut { ticket } => self.on_connect_timeout(ticket),
            Input::DisconnectRequested => self.on_disconnect_requested(),
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!("Link state {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn on_radio_event(&mut self, event: RadioEvent<P, S, C>) -> Vec<Action<P, S>> {
        match event {
            RadioEvent::AdapterStateChanged(state) => self.on_adapter_state(state),
            RadioEvent::AdvertiserSighted(advertiser) => self.on_sighting(advertiser),
            RadioEvent::Connected(peripheral) => self.on_connected(peripheral),
            RadioEvent::Disconnected { peripheral, reason } => {
                self.on_disconnected(peripheral, reason)
            }
            RadioEvent::ServicesDiscovered {
                peripheral,
                services,
                error,
            } => self.on_services(peripheral, services, error),
            RadioEvent::CharacteristicsDiscovered {
                service,
                characteristics,
                error,
            } => self.on_characteristics(service, characteristics, error),
        }
    }

    fn on_adapter_state(&mut self, adapter: AdapterState) -> Vec<Action<P, S>> {
        self.adapter = adapter;

        if adapter.is_powered_on() {
            let restartable = matches!(
                self.state,
                ConnectionState::Idle | ConnectionState::Disconnected | ConnectionState::Failed
            );
            if self.target.is_none() && restartable {
                info!("Bluetooth is powered on, scanning for {}", self.selector.target_name());
                self.transition(ConnectionState::Scanning);
                return vec![Action::StartScan {
                    service_filter: None,
                }];
            }
            return Vec::new();
        }

        if self.state != ConnectionState::Idle {
            warn!("Bluetooth unavailable ({}), dropping mirror binding", adapter);
        }

        let mut actions = Vec::new();
        if let Some(ticket) = self.pending_connect.take() {
            actions.push(Action::ResolveConnect {
                ticket,
                outcome: Err(MirrorError::AdapterUnavailable {
                    state: adapter.to_string(),
                }),
            });
        }
        self.target = None;
        self.binding = Binding::Unbound;
        self.connected = false;
        self.transition(ConnectionState::Idle);
        actions
    }

    fn on_sighting(&mut self, advertiser: Advertiser<P>) -> Vec<Action<P, S>> {
        if !self.selector.observe(&advertiser) {
            return Vec::new();
        }
        if self.state != ConnectionState::Scanning {
            debug!("Ignoring mirror sighting in state {}", self.state);
            return Vec::new();
        }

        info!("Found mirror {:?}", advertiser.peripheral);
        self.target = Some(advertiser.peripheral);
        self.binding = Binding::Unbound;
        self.transition(ConnectionState::Discovered);
        vec![Action::StopScan]
    }

    fn on_connect_requested(&mut self, ticket: u64) -> Vec<Action<P, S>> {
        let refuse = |error: MirrorError| {
            vec![Action::ResolveConnect {
                ticket,
                outcome: Err(error),
            }]
        };

        if !self.adapter.is_powered_on() {
            return refuse(MirrorError::AdapterUnavailable {
                state: self.adapter.to_string(),
            });
        }
        let Some(target) = self.target.clone() else {
            return refuse(MirrorError::TargetNotFound);
        };
        if self.pending_connect.is_some() {
            return refuse(MirrorError::ConnectionInProgress);
        }
        if self.connected {
            return vec![Action::ResolveConnect {
                ticket,
                outcome: Ok(()),
            }];
        }

        self.pending_connect = Some(ticket);
        self.transition(ConnectionState::Connecting);
        vec![
            Action::Connect(target),
            Action::ArmConnectTimeout {
                ticket,
                after: self.connect_timeout,
            },
        ]
    }

    fn on_connect_timeout(&mut self, ticket: u64) -> Vec<Action<P, S>> {
        if self.pending_connect != Some(ticket) {
            return Vec::new();
        }
        self.pending_connect = None;

        if self.connected {
            return vec![Action::ResolveConnect {
                ticket,
                outcome: Ok(()),
            }];
        }

        warn!("Connection to mirror timed out");
        if self.state == ConnectionState::Connecting {
            self.transition(ConnectionState::Failed);
        }
        vec![Action::ResolveConnect {
            ticket,
            outcome: Err(MirrorError::ConnectTimeout),
        }]
    }

    fn on_connected(&mut self, peripheral: P) -> Vec<Action<P, S>> {
        if self.target.as_ref() != Some(&peripheral) || self.connected {
            return Vec::new();
        }
        match self.state {
            // Failed covers a late link-up after the connect timeout
            ConnectionState::Connecting | ConnectionState::Failed => {}
            ConnectionState::Disconnected => {
                debug!("Link came up after teardown was requested, cancelling");
                return vec![Action::CancelConnection(peripheral)];
            }
            state => {
                debug!("Ignoring link-up in state {}", state);
                return Vec::new();
            }
        }

        info!("Connected to mirror");
        self.connected = true;
        self.transition(ConnectionState::DiscoveringServices);

        let mut actions = Vec::with_capacity(2);
        if let Some(ticket) = self.pending_connect.take() {
            actions.push(Action::ResolveConnect {
                ticket,
                outcome: Ok(()),
            });
        }
        actions.push(Action::DiscoverServices {
            peripheral,
            ids: vec![self.service_uuid],
        });
        actions
    }

    fn on_disconnected(&mut self, peripheral: P, reason: Option<String>) -> Vec<Action<P, S>> {
        if self.target.as_ref() != Some(&peripheral) {
            return Vec::new();
        }
        self.connected = false;
        self.binding = Binding::Unbound;

        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnected => Vec::new(),
            ConnectionState::Connecting => {
                let reason = reason.unwrap_or_else(|| "link dropped".to_string());
                warn!("Failed to connect to mirror: {}", reason);
                self.transition(ConnectionState::Failed);
                match self.pending_connect.take() {
                    Some(ticket) => vec![Action::ResolveConnect {
                        ticket,
                        outcome: Err(MirrorError::ConnectionFailed(reason)),
                    }],
                    None => Vec::new(),
                }
            }
            _ => {
                match reason {
                    Some(reason) => info!("Mirror disconnected: {}", reason),
                    None => info!("Mirror disconnected"),
                }
                self.transition(ConnectionState::Disconnected);
                Vec::new()
            }
        }
    }

    fn on_services(
        &mut self,
        peripheral: P,
        services: Vec<Discovered<S>>,
        error: Option<String>,
    ) -> Vec<Action<P, S>> {
        if self.state != ConnectionState::DiscoveringServices
            || self.target.as_ref() != Some(&peripheral)
        {
            return Vec::new();
        }
        if let Some(error) = error {
            warn!("Error discovering services: {}", error);
            return Vec::new();
        }

        match services.into_iter().find(|s| s.uuid == self.service_uuid) {
            Some(found) => {
                self.binding = Binding::ServiceOnly {
                    service: found.handle.clone(),
                };
                self.transition(ConnectionState::DiscoveringCharacteristics);
                vec![Action::DiscoverCharacteristics {
                    service: found.handle,
                    ids: vec![self.characteristic_uuid],
                }]
            }
            None => {
                warn!("Mirror does not offer service {}", self.service_uuid);
                Vec::new()
            }
        }
    }

    fn on_characteristics(
        &mut self,
        service: S,
        characteristics: Vec<Discovered<C>>,
        error: Option<String>,
    ) -> Vec<Action<P, S>> {
        if self.state != ConnectionState::DiscoveringCharacteristics {
            return Vec::new();
        }
        match &self.binding {
            Binding::ServiceOnly { service: bound } if *bound == service => {}
            _ => return Vec::new(),
        }
        if let Some(error) = error {
            warn!("Error discovering characteristics for service {}: {}", self.service_uuid, error);
            return Vec::new();
        }

        match characteristics
            .into_iter()
            .find(|c| c.uuid == self.characteristic_uuid)
        {
            Some(found) => {
                info!("Found command characteristic: {}", found.uuid);
                self.binding = Binding::FullyBound {
                    service,
                    characteristic: found.handle,
                };
                self.transition(ConnectionState::Ready);
            }
            None => warn!(
                "Command characteristic {} not found in service {}",
                self.characteristic_uuid, self.service_uuid
            ),
        }
        Vec::new()
    }

    fn on_disconnect_requested(&mut self) -> Vec<Action<P, S>> {
        let mut actions = Vec::new();
        match (self.state, self.target.clone()) {
            (ConnectionState::Disconnected, _) => return actions,
            (ConnectionState::Scanning, _) => {
                debug!("No mirror bound yet, scan continues");
                return actions;
            }
            (
                ConnectionState::Connecting
                | ConnectionState::DiscoveringServices
                | ConnectionState::DiscoveringCharacteristics
                | ConnectionState::Ready
                | ConnectionState::Failed,
                Some(target),
            ) => actions.push(Action::CancelConnection(target)),
            _ => {}
        }

        info!("Disconnecting from mirror");
        self.connected = false;
        self.binding = Binding::Unbound;
        self.transition(ConnectionState::Disconnected);
        actions
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
