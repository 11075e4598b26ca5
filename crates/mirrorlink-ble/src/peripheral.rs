//! Peripheral handle passed through the mirror link

use std::fmt;

use btleplug::api::Peripheral as _;
use btleplug::platform::{Peripheral as PlatformPeripheral, PeripheralId};

/// A platform peripheral compared by its stable identifier
#[derive(Clone)]
pub struct BlePeripheral {
    id: PeripheralId,
    inner: PlatformPeripheral,
}

impl BlePeripheral {
    pub fn new(inner: PlatformPeripheral) -> Self {
        Self {
            id: inner.id(),
            inner,
        }
    }

    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    /// Underlying btleplug peripheral
    pub fn platform(&self) -> &PlatformPeripheral {
        &self.inner
    }
}

impl PartialEq for BlePeripheral {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BlePeripheral {}

impl fmt::Debug for BlePeripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BlePeripheral").field(&self.id).finish()
    }
}

impl fmt::Display for BlePeripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.id)
    }
}
