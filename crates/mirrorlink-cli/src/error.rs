//! Error handling for the mirrorlink CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Mirror link error: {0}")]
    Mirror(#[from] mirrorlink_core::MirrorError),

    #[error("BLE radio error: {0}")]
    Ble(#[from] mirrorlink_ble::BleRadioError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
