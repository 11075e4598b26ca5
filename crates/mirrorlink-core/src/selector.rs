//! Target peripheral selection over advertiser sightings

use tracing::debug;

use crate::radio::Advertiser;

/// Picks the mirror out of the advertisers seen while scanning
#[derive(Debug, Clone)]
pub struct PeripheralSelector {
    target_name: String,
    most_recent: Option<String>,
}

impl PeripheralSelector {
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            most_recent: None,
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Name of the last advertiser seen with a non-empty name
    pub fn most_recent(&self) -> Option<&str> {
        self.most_recent.as_deref()
    }

    /// Record a sighting and report whether it is the target
    ///
    /// Unnamed advertisers are never the target and do not overwrite the
    /// most recent name.
    pub fn observe<P>(&mut self, advertiser: &Advertiser<P>) -> bool {
        let Some(name) = advertiser.usable_name() else {
            return false;
        };

        match advertiser.rssi {
            Some(rssi) => debug!("Discovered {} at {}", name, rssi),
            None => debug!("Discovered {}", name),
        }
        self.most_recent = Some(name.to_string());

        name == self.target_name
    }

    /// Forget the diagnostic name
    pub fn reset(&mut self) {
        self.most_recent = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(id: u8, name: Option<&str>) -> Advertiser<u8> {
        Advertiser {
            peripheral: id,
            name: name.map(str::to_string),
            rssi: Some(-60),
        }
    }

    #[test]
    fn test_matches_exact_name_only() {
        let mut selector = PeripheralSelector::new("ESP32-BLE-Server");
        assert!(!selector.observe(&sighting(1, Some("ESP32-BLE-Server-2"))));
        assert!(!selector.observe(&sighting(2, Some("esp32-ble-server"))));
        assert!(selector.observe(&sighting(3, Some("ESP32-BLE-Server"))));
    }

    #[test]
    fn test_most_recent_is_rolling() {
        let mut selector = PeripheralSelector::new("ESP32-BLE-Server");
        assert_eq!(selector.most_recent(), None);

        selector.observe(&sighting(1, Some("Other")));
        assert_eq!(selector.most_recent(), Some("Other"));

        selector.observe(&sighting(2, Some("Headphones")));
        assert_eq!(selector.most_recent(), Some("Headphones"));

        // Nameless sightings leave the last name in place
        selector.observe(&sighting(3, None));
        selector.observe(&sighting(4, Some("")));
        assert_eq!(selector.most_recent(), Some("Headphones"));
    }

    #[test]
    fn test_unnamed_never_matches() {
        let mut selector = PeripheralSelector::new("");
        assert!(!selector.observe(&sighting(1, Some(""))));
        assert!(!selector.observe(&sighting(2, None)));
    }
}
