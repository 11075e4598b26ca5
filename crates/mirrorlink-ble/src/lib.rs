//! Bluetooth Low Energy radio for the smart-mirror link
//!
//! This crate implements [`mirrorlink_core::RadioAdapter`] on top of
//! `btleplug`, in the central role only.
//!
//! ## Architecture
//!
//! - [`error`] - Errors raised by the platform BLE stack
//! - [`peripheral`] - Peripheral handle compared by id
//! - [`discovery`] - Central event pump and GATT selection
//! - [`radio`] - The adapter itself
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mirrorlink_ble::BtleplugRadio;
//! use mirrorlink_core::{CipherContext, MirrorConfig, MirrorLink};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (radio, events) = BtleplugRadio::new().await?;
//! let (link, _task) =
//!     MirrorLink::spawn(radio, events, &MirrorConfig::default(), CipherContext::default());
//!
//! link.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod error;
pub mod peripheral;
pub mod radio;

// Public API exports
pub use discovery::{map_central_state, BleEvent};
pub use error::BleRadioError;
pub use peripheral::BlePeripheral;
pub use radio::BtleplugRadio;
