//! Error types for the mirror link

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors surfaced by the mirror link
///
/// Adapter-level conditions reach the UI only through [`LinkStatus`](crate::LinkStatus);
/// these values are returned to callers of the control surface and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// Radio is powered off, unauthorized or unsupported
    #[error("BLE adapter not available ({state})")]
    AdapterUnavailable { state: String },

    /// Scanning is ongoing and the mirror has not been sighted yet
    #[error("Target peripheral not found yet")]
    TargetNotFound,

    #[error("Connection timeout")]
    ConnectTimeout,

    #[error("Connection already in progress")]
    ConnectionInProgress,

    #[error("Failed to connect to mirror: {0}")]
    ConnectionFailed(String),

    #[error("Mirror not connected")]
    NotConnected,

    /// Service or command characteristic has not been resolved
    #[error("Service/characteristic binding incomplete")]
    BindingIncomplete,

    #[error("Failed to write to characteristic: {0}")]
    TransportWriteFailed(String),

    #[error("Cipher failure: {0}")]
    EncryptionFailed(String),

    #[error("Invalid wire payload: {0}")]
    InvalidPayload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Link task is no longer running")]
    LinkClosed,
}

impl MirrorError {
    /// Whether the caller may simply retry the same operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MirrorError::ConnectTimeout
                | MirrorError::ConnectionFailed(_)
                | MirrorError::TransportWriteFailed(_)
                | MirrorError::TargetNotFound
        )
    }
}

/// Result type for mirror link operations
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MirrorError::ConnectTimeout.is_retryable());
        assert!(MirrorError::TransportWriteFailed("gatt".into()).is_retryable());
        assert!(!MirrorError::BindingIncomplete.is_retryable());
        assert!(!MirrorError::AdapterUnavailable {
            state: "PoweredOff".into()
        }
        .is_retryable());
    }
}
