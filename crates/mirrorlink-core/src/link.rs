//! Mirror link task
//!
//! Owns the [`ConnectionMachine`] and serializes radio events, connect
//! timeouts and caller requests onto one task. Callers talk to it through a
//! cloneable [`LinkHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cipher::CipherContext;
use crate::codec::{Command, CommandCodec};
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::radio::{AdapterEvent, RadioAdapter};
use crate::state::{Action, ConnectionMachine, Input, LinkStatus};
use crate::telemetry::CommandSink;

type MachineFor<A> = ConnectionMachine<
    <A as RadioAdapter>::Peripheral,
    <A as RadioAdapter>::Service,
    <A as RadioAdapter>::Characteristic,
>;

type ActionFor<A> = Action<<A as RadioAdapter>::Peripheral, <A as RadioAdapter>::Service>;

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum LinkRequest {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        command: Command,
        reply: oneshot::Sender<Result<()>>,
    },
}

// ----------------------------------------------------------------------------
// Link Task
// ----------------------------------------------------------------------------

/// Event loop driving one connection to the mirror
pub struct MirrorLink<A: RadioAdapter> {
    adapter: Arc<A>,
    machine: MachineFor<A>,
    codec: CommandCodec,
    events: mpsc::UnboundedReceiver<AdapterEvent<A>>,
    requests: mpsc::UnboundedReceiver<LinkRequest>,
    timeout_tx: mpsc::UnboundedSender<u64>,
    timeout_rx: mpsc::UnboundedReceiver<u64>,
    pending_connects: HashMap<u64, oneshot::Sender<Result<()>>>,
    next_ticket: u64,
    status: watch::Sender<LinkStatus>,
}

impl<A: RadioAdapter> MirrorLink<A> {
    /// Create the link task and the handle used to control it
    pub fn new(
        adapter: A,
        events: mpsc::UnboundedReceiver<AdapterEvent<A>>,
        config: &MirrorConfig,
        cipher: CipherContext,
    ) -> (Self, LinkHandle) {
        let machine: MachineFor<A> = ConnectionMachine::new(config);
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(machine.status());

        let link = Self {
            adapter: Arc::new(adapter),
            machine,
            codec: CommandCodec::new(cipher),
            events,
            requests: request_rx,
            timeout_tx,
            timeout_rx,
            pending_connects: HashMap::new(),
            next_ticket: 1,
            status: status_tx,
        };
        let handle = LinkHandle {
            requests: request_tx,
            status: status_rx,
        };
        (link, handle)
    }

    /// Create the link and run it on a background task
    pub fn spawn(
        adapter: A,
        events: mpsc::UnboundedReceiver<AdapterEvent<A>>,
        config: &MirrorConfig,
        cipher: CipherContext,
    ) -> (LinkHandle, JoinHandle<()>) {
        let (link, handle) = Self::new(adapter, events, config, cipher);
        (handle, tokio::spawn(link.run()))
    }

    /// Main loop; returns once every [`LinkHandle`] has been dropped
    pub async fn run(mut self) {
        info!("Mirror link task starting");

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(Input::Radio(event)).await,
                    None => {
                        error!("Radio event stream closed, shutting down");
                        break;
                    }
                },

                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => {
                        info!("All link handles dropped, shutting down");
                        break;
                    }
                },

                Some(ticket) = self.timeout_rx.recv() => {
                    self.dispatch(Input::ConnectTimedOut { ticket }).await;
                }
            }
        }

        info!("Mirror link task stopped");
    }

    async fn handle_request(&mut self, request: LinkRequest) {
        match request {
            LinkRequest::Connect { reply } => {
                let ticket = self.next_ticket;
                self.next_ticket += 1;
                self.pending_connects.insert(ticket, reply);
                self.dispatch(Input::ConnectRequested { ticket }).await;
            }
            LinkRequest::Disconnect { reply } => {
                self.dispatch(Input::DisconnectRequested).await;
                let _ = reply.send(());
            }
            LinkRequest::Send { command, reply } => {
                let result = self.write_command(&command).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn dispatch(&mut self, input: Input<A::Peripheral, A::Service, A::Characteristic>) {
        let actions = self.machine.handle(input);
        // Published before any connect is resolved, so a woken caller sees
        // the state that resolved it
        self.publish_status();
        for action in actions {
            self.execute(action).await;
        }
    }

    fn publish_status(&self) {
        let status = self.machine.status();
        self.status.send_if_modified(|current| {
            if *current != status {
                *current = status;
                true
            } else {
                false
            }
        });
    }

    async fn execute(&mut self, action: ActionFor<A>) {
        let result = match action {
            Action::StartScan { service_filter } => self.adapter.scan(service_filter).await,
            Action::StopScan => self.adapter.stop_scan().await,
            Action::Connect(peripheral) => self.adapter.connect(&peripheral).await,
            Action::CancelConnection(peripheral) => {
                self.adapter.cancel_connection(&peripheral).await
            }
            Action::DiscoverServices { peripheral, ids } => {
                self.adapter.discover_services(&peripheral, &ids).await
            }
            Action::DiscoverCharacteristics { service, ids } => {
                self.adapter.discover_characteristics(&service, &ids).await
            }
            Action::ArmConnectTimeout { ticket, after } => {
                let timeout_tx = self.timeout_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = timeout_tx.send(ticket);
                });
                Ok(())
            }
            Action::ResolveConnect { ticket, outcome } => {
                match self.pending_connects.remove(&ticket) {
                    Some(reply) => {
                        let _ = reply.send(outcome);
                    }
                    None => debug!("Connect ticket {} already resolved", ticket),
                }
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("Radio adapter error: {}", e);
        }
    }

    async fn write_command(&self, command: &Command) -> Result<()> {
        let (peripheral, characteristic) = self.machine.write_target().map_err(|e| {
            warn!("Refusing to send {}: {}", command.key, e);
            e
        })?;

        let payload = self.codec.encode(command);
        self.adapter
            .write_value(peripheral, characteristic, &payload, true)
            .await
            .map_err(|e| {
                let e = match e {
                    MirrorError::TransportWriteFailed(_) => e,
                    other => MirrorError::TransportWriteFailed(other.to_string()),
                };
                warn!("Failed to send {}: {}", command.key, e);
                e
            })?;

        debug!("Sent {} ({} bytes)", command.key, payload.len());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Link Handle
// ----------------------------------------------------------------------------

/// Control surface of a running [`MirrorLink`]
#[derive(Debug, Clone)]
pub struct LinkHandle {
    requests: mpsc::UnboundedSender<LinkRequest>,
    status: watch::Receiver<LinkStatus>,
}

impl LinkHandle {
    /// Request the link; resolves once it is up or the connect timeout passed
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(LinkRequest::Connect { reply })?;
        rx.await.map_err(|_| MirrorError::LinkClosed)?
    }

    /// Callback flavour of [`connect`](Self::connect); `on_result` runs exactly once
    pub fn connect_with<F>(&self, on_result: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            let result = handle.connect().await;
            if let Err(e) = &result {
                info!("Failed to connect to the device: {}", e);
            }
            on_result(result.is_ok());
        });
    }

    /// Tear the link down; always accepted
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(LinkRequest::Disconnect { reply })?;
        rx.await.map_err(|_| MirrorError::LinkClosed)
    }

    /// Encode and write one command with an acknowledged write
    pub async fn send_command(&self, key: &str, value: &str) -> Result<()> {
        self.send(Command::new(key, value)).await
    }

    pub async fn send(&self, command: Command) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(LinkRequest::Send { command, reply })?;
        rx.await.map_err(|_| MirrorError::LinkClosed)?
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    pub fn most_recent_advertiser(&self) -> Option<String> {
        self.status.borrow().most_recent_advertiser.clone()
    }

    /// Receiver that observes every status change
    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    fn request(&self, request: LinkRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| MirrorError::LinkClosed)
    }
}

#[async_trait]
impl CommandSink for LinkHandle {
    async fn deliver(&self, command: Command) -> Result<()> {
        self.send(command).await
    }
}
