//! Error types for the btleplug radio adapter

use mirrorlink_core::MirrorError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised by the platform BLE stack
#[derive(Error, Debug)]
pub enum BleRadioError {
    #[error("Failed to create BLE manager: {0}")]
    ManagerFailed(String),

    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Failed to start BLE scan: {0}")]
    ScanFailed(String),

    #[error("Failed to connect to peripheral: {0}")]
    ConnectionFailed(String),

    #[error("Failed to disconnect from peripheral: {0}")]
    DisconnectFailed(String),

    #[error("Failed to discover services: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("Failed to write to characteristic: {0}")]
    WriteFailed(String),
}

impl From<BleRadioError> for MirrorError {
    fn from(err: BleRadioError) -> Self {
        match err {
            BleRadioError::ManagerFailed(_)
            | BleRadioError::AdapterNotAvailable
            | BleRadioError::EventStreamFailed(_)
            | BleRadioError::ScanFailed(_) => MirrorError::AdapterUnavailable {
                state: err.to_string(),
            },
            BleRadioError::WriteFailed(reason) => MirrorError::TransportWriteFailed(reason),
            BleRadioError::ConnectionFailed(reason) => MirrorError::ConnectionFailed(reason),
            BleRadioError::DisconnectFailed(_) | BleRadioError::ServiceDiscoveryFailed(_) => {
                MirrorError::ConnectionFailed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_failure_maps_to_transport_error() {
        let err: MirrorError = BleRadioError::WriteFailed("gatt 0x03".into()).into();
        assert_eq!(err, MirrorError::TransportWriteFailed("gatt 0x03".into()));
    }

    #[test]
    fn test_adapter_failures_map_to_unavailable() {
        let err: MirrorError = BleRadioError::AdapterNotAvailable.into();
        assert!(matches!(err, MirrorError::AdapterUnavailable { .. }));
    }
}
