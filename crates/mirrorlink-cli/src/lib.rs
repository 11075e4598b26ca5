//! mirrorlink CLI library
//!
//! The companion-app surface for the smart mirror without a GUI: scanning
//! diagnostics, telemetry relay and offline payload tools.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::MirrorApp;
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
