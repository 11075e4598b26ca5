//! mirrorlink CLI configuration
//!
//! Loaded from a TOML file with three optional sections:
//!
//! ```toml
//! [link]
//! target_name = "ESP32-BLE-Server"
//! connect_timeout_ms = 1500
//! flush_interval_secs = 60
//!
//! [cipher]
//! key = "49534d2d6d6972726f722d6b65793136"
//! iv = "49534d2d6d6972726f722d69762d3136"
//!
//! [identity]
//! name = "Alice"
//! ```
//!
//! Anything left out falls back to the built-in mirror settings.

use std::path::Path;
use std::time::Duration;

use mirrorlink_core::{CipherContext, MirrorConfig};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub cipher: CipherConfig,
    pub identity: IdentityConfig,
}

/// Link and telemetry timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub target_name: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub connect_timeout_ms: u64,
    /// How long to scan for the mirror before giving up
    pub scan_timeout_secs: u64,
    /// How long to wait for service discovery after the link is up
    pub ready_timeout_secs: u64,
    pub connect_attempts: u32,
    pub initial_flush_delay_secs: u64,
    pub flush_interval_secs: u64,
}

/// Hex-encoded AES-128 key and IV; both or neither
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    pub key: Option<String>,
    pub iv: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name sent with every telemetry batch
    pub name: String,
    pub key: String,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for LinkConfig {
    fn default() -> Self {
        let mirror = MirrorConfig::default();
        Self {
            target_name: mirror.target_name,
            service_uuid: mirror.service_uuid,
            characteristic_uuid: mirror.characteristic_uuid,
            connect_timeout_ms: mirror.connect_timeout.as_millis() as u64,
            scan_timeout_secs: 30,
            ready_timeout_secs: 10,
            connect_attempts: 3,
            initial_flush_delay_secs: mirror.initial_flush_delay.as_secs(),
            flush_interval_secs: mirror.flush_interval.as_secs(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "Anonymous".to_string(),
            key: MirrorConfig::default().identity_key,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.link.target_name.is_empty() {
            return Err(CliError::Config("link.target_name must not be empty".into()));
        }
        if self.link.flush_interval_secs == 0 {
            return Err(CliError::Config("link.flush_interval_secs must be positive".into()));
        }
        if self.link.connect_attempts == 0 {
            return Err(CliError::Config("link.connect_attempts must be at least 1".into()));
        }
        if self.cipher.key.is_some() != self.cipher.iv.is_some() {
            return Err(CliError::Config("cipher.key and cipher.iv must be set together".into()));
        }
        Ok(())
    }

    /// Link settings for the core crate
    pub fn mirror_config(&self) -> MirrorConfig {
        MirrorConfig::new()
            .with_target_name(self.link.target_name.clone())
            .with_uuids(self.link.service_uuid, self.link.characteristic_uuid)
            .with_connect_timeout(Duration::from_millis(self.link.connect_timeout_ms))
            .with_initial_flush_delay(Duration::from_secs(self.link.initial_flush_delay_secs))
            .with_flush_interval(Duration::from_secs(self.link.flush_interval_secs))
            .with_identity_key(self.identity.key.clone())
    }

    pub fn cipher_context(&self) -> Result<CipherContext> {
        match (&self.cipher.key, &self.cipher.iv) {
            (Some(key), Some(iv)) => Ok(CipherContext::from_hex(key, iv)?),
            _ => Ok(CipherContext::default()),
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.link.scan_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.link.ready_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorlink_core::{Command, CommandCodec, MIRROR_SERVICE_UUID};

    #[test]
    fn test_empty_file_uses_mirror_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.mirror_config(), MirrorConfig::default());
        assert_eq!(config.link.service_uuid, MIRROR_SERVICE_UUID);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [link]
            target_name = "Hallway-Mirror"
            connect_timeout_ms = 3000

            [identity]
            name = "Alice"
            "#,
        )
        .unwrap();

        let mirror = config.mirror_config();
        assert_eq!(mirror.target_name, "Hallway-Mirror");
        assert_eq!(mirror.connect_timeout, Duration::from_secs(3));
        assert_eq!(mirror.flush_interval, Duration::from_secs(60));
        assert_eq!(config.identity.name, "Alice");
        assert_eq!(config.identity.key, "Name");
    }

    #[test]
    fn test_cipher_override() {
        let config = AppConfig::from_toml(
            r#"
            [cipher]
            key = "000102030405060708090a0b0c0d0e0f"
            iv = "0f0e0d0c0b0a09080706050403020100"
            "#,
        )
        .unwrap();
        let custom = CommandCodec::new(config.cipher_context().unwrap());
        let payload = custom.encode(&Command::new("Name", "Alice"));

        assert_eq!(custom.decode(&payload).unwrap(), "Name: Alice+");
        assert_ne!(payload, CommandCodec::default().encode(&Command::new("Name", "Alice")));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(AppConfig::from_toml("[link]\ntarget_name = \"\"").is_err());
        assert!(AppConfig::from_toml("[link]\nflush_interval_secs = 0").is_err());
        assert!(AppConfig::from_toml("[cipher]\nkey = \"00\"").is_err());
        assert!(AppConfig::from_toml("[link]\nconnect_timeout_ms = \"soon\"").is_err());

        let bad_hex = AppConfig::from_toml("[cipher]\nkey = \"zz\"\niv = \"zz\"").unwrap();
        assert!(bad_hex.cipher_context().is_err());
    }
}
