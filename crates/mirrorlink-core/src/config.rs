//! Mirror link configuration

use std::time::Duration;

use uuid::Uuid;

use crate::protocol::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_FLUSH_INTERVAL, DEFAULT_INITIAL_FLUSH_DELAY, IDENTITY_KEY,
    MIRROR_COMMAND_CHARACTERISTIC_UUID, MIRROR_DEVICE_NAME, MIRROR_SERVICE_UUID,
};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the mirror link
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Advertised name that identifies the mirror
    pub target_name: String,
    /// Service holding the command characteristic
    pub service_uuid: Uuid,
    /// Characteristic that receives encrypted commands
    pub characteristic_uuid: Uuid,
    /// Maximum time to wait for a connect request to reach the link
    pub connect_timeout: Duration,
    /// Delay before the first telemetry flush
    pub initial_flush_delay: Duration,
    /// Period between telemetry flushes
    pub flush_interval: Duration,
    /// Key used for the identity entry seeded into each batch
    pub identity_key: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            target_name: MIRROR_DEVICE_NAME.to_string(),
            service_uuid: MIRROR_SERVICE_UUID,
            characteristic_uuid: MIRROR_COMMAND_CHARACTERISTIC_UUID,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            initial_flush_delay: DEFAULT_INITIAL_FLUSH_DELAY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            identity_key: IDENTITY_KEY.to_string(),
        }
    }
}

impl MirrorConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised name of the mirror
    pub fn with_target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = name.into();
        self
    }

    /// Set the service and characteristic identifiers
    pub fn with_uuids(mut self, service: Uuid, characteristic: Uuid) -> Self {
        self.service_uuid = service;
        self.characteristic_uuid = characteristic;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the delay before the first flush
    pub fn with_initial_flush_delay(mut self, delay: Duration) -> Self {
        self.initial_flush_delay = delay;
        self
    }

    /// Set the flush period
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the identity entry key
    pub fn with_identity_key(mut self, key: impl Into<String>) -> Self {
        self.identity_key = key.into();
        self
    }
}
