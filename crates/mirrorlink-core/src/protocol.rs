//! Mirror protocol constants and target identity

use std::time::Duration;

use uuid::Uuid;

// ----------------------------------------------------------------------------
// BLE Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// Advertised name of the mirror peripheral
pub const MIRROR_DEVICE_NAME: &str = "ESP32-BLE-Server";

/// Mirror command service (16-bit `c0fe` in the Bluetooth base UUID)
pub const MIRROR_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000C0FE_0000_1000_8000_00805F9B34FB);

/// Command characteristic inside the mirror service (16-bit `3dee`)
pub const MIRROR_COMMAND_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00003DEE_0000_1000_8000_00805F9B34FB);

// ----------------------------------------------------------------------------
// Framing and Timing
// ----------------------------------------------------------------------------

/// End-of-message marker the mirror uses to frame commands
pub const COMMAND_TERMINATOR: char = '+';

/// Separator between key and value in a command
pub const KEY_VALUE_SEPARATOR: &str = ": ";

/// Key of the identity entry seeded into every telemetry batch
pub const IDENTITY_KEY: &str = "Name";

/// Command announcing a freshly established link
pub const CONNECTED_COMMAND: &str = "Connected";

/// Command announcing an explicit teardown
pub const DISCONNECTED_COMMAND: &str = "Disconnected";

/// How long a connect request waits for the link before resolving as failed
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Delay before the first flush once telemetry is enabled
pub const DEFAULT_INITIAL_FLUSH_DELAY: Duration = Duration::from_secs(2);

/// Period between telemetry flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

// ----------------------------------------------------------------------------
// Protocol Utilities
// ----------------------------------------------------------------------------

/// Expand a 16-bit assigned number into the Bluetooth base UUID
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_00805F9B34FB)
}
