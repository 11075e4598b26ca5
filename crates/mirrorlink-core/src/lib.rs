//! Smart-mirror companion link
//!
//! This crate holds everything about talking to the mirror that does not
//! depend on a particular Bluetooth stack: the connection state machine, the
//! encrypted command codec and the telemetry batcher. Platform BLE access is
//! plugged in through the [`RadioAdapter`] trait.
//!
//! ## Architecture
//!
//! - [`protocol`] - Mirror identity, UUIDs, framing and timing constants
//! - [`config`] - Link configuration
//! - [`cipher`] / [`codec`] - AES-128-CBC encryption and the text wire encoding
//! - [`selector`] - Picking the mirror out of nearby advertisers
//! - [`state`] - Pure connection state machine
//! - [`link`] - Task that owns the machine and drives the radio adapter
//! - [`telemetry`] - Queue, batcher and flush schedule for health values
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mirrorlink_core::{CipherContext, MirrorConfig, MirrorLink, RadioAdapter, AdapterEvent};
//! use tokio::sync::mpsc::UnboundedReceiver;
//!
//! # async fn example<A: RadioAdapter>(adapter: A, events: UnboundedReceiver<AdapterEvent<A>>)
//! # -> mirrorlink_core::Result<()> {
//! let (link, _task) =
//!     MirrorLink::spawn(adapter, events, &MirrorConfig::default(), CipherContext::default());
//!
//! link.connect().await?;
//! link.send_command("Name", "Alice").await?;
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod cipher;
pub mod codec;
pub mod config;
pub mod error;
pub mod link;
pub mod protocol;
pub mod radio;
pub mod selector;
pub mod state;
pub mod telemetry;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use cipher::CipherContext;
pub use codec::{Command, CommandCodec};
pub use config::MirrorConfig;
pub use error::{MirrorError, Result};
pub use link::{LinkHandle, MirrorLink};
pub use protocol::{
    CONNECTED_COMMAND, DISCONNECTED_COMMAND, IDENTITY_KEY, MIRROR_COMMAND_CHARACTERISTIC_UUID,
    MIRROR_DEVICE_NAME, MIRROR_SERVICE_UUID,
};
pub use radio::{AdapterEvent, AdapterState, Advertiser, Discovered, RadioAdapter, RadioEvent};
pub use selector::PeripheralSelector;
pub use state::{Action, Binding, ConnectionMachine, ConnectionState, Input, LinkStatus};
pub use telemetry::{
    CommandSink, FlushReport, IdentitySource, TelemetryBatcher, TelemetryEntry, TelemetryQueue,
    TelemetryScheduler, TelemetrySender,
};
