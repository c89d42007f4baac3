//! Platform connectivity queries: whether a wireless network is active, its
//! name, and the device-wide traffic counters.
//!
//! Observers hold no state of their own beyond what the platform needs to
//! answer a query; every call reflects the platform at that moment.

mod system;

use async_trait::async_trait;
use thiserror::Error;

pub use system::SystemObserver;

use crate::models::TrafficTotals;

/// Errors raised while querying the platform.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// A platform tool could not be run or exited unsuccessfully.
    #[error("Platform query '{command}' failed: {reason}")]
    CommandFailed {
        /// The command that was run.
        command: String,
        /// Why it failed.
        reason: String,
    },

    /// A platform tool did not answer in time.
    #[error("Platform query '{0}' timed out")]
    Timeout(String),
}

/// One snapshot of the wireless state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Whether any wireless network is currently active.
    pub wireless_active: bool,
    /// The normalized network name, `None` when it cannot be determined.
    pub network_name: Option<String>,
}

/// How an observation relates to the tracked network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// The active network is the target.
    Associated,
    /// No wireless network, or a different one, is active.
    NotAssociated,
    /// A wireless network is active but its name is unknown.
    Indeterminate,
}

impl Observation {
    /// Classifies this observation against the target network name.
    pub fn association(&self, target: &str) -> Association {
        if !self.wireless_active {
            return Association::NotAssociated;
        }
        match &self.network_name {
            None => Association::Indeterminate,
            Some(name) if matches_target(name, target) => Association::Associated,
            Some(_) => Association::NotAssociated,
        }
    }
}

/// Read access to the platform's connectivity state.
#[async_trait]
pub trait ConnectivityObserver: Send + Sync {
    /// Queries the current wireless state.
    async fn observe(&self) -> Result<Observation, ObserverError>;

    /// Cumulative device-wide receive/transmit counters since boot.
    fn traffic_totals(&self) -> TrafficTotals;
}

/// Normalizes a raw network name: quotes removed, whitespace trimmed.
/// Empty names and the platform placeholder `<unknown ssid>` yield `None`.
pub fn normalize_network_name(raw: &str) -> Option<String> {
    let name = raw.replace('"', "");
    let name = name.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("<unknown ssid>") {
        return None;
    }
    Some(name.to_string())
}

/// Case-insensitive comparison of an observed name with the target. The
/// observed name may carry extra characters around the target name.
pub fn matches_target(observed: &str, target: &str) -> bool {
    let target = target.trim().to_lowercase();
    if target.is_empty() {
        return false;
    }
    let observed = observed.trim().to_lowercase();
    observed == target || observed.contains(&target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_network_name() {
        assert_eq!(normalize_network_name("\"Office\""), Some("Office".to_string()));
        assert_eq!(normalize_network_name("  Home Net  "), Some("Home Net".to_string()));
        assert_eq!(normalize_network_name("<unknown ssid>"), None);
        assert_eq!(normalize_network_name("<UNKNOWN SSID>"), None);
        assert_eq!(normalize_network_name("\"\""), None);
        assert_eq!(normalize_network_name("   "), None);
    }

    #[test]
    fn test_matches_target() {
        assert!(matches_target("office", "Office"));
        assert!(matches_target("Office-5G", "office"));
        assert!(!matches_target("Cafe", "Office"));
        assert!(!matches_target("Office", ""));
        assert!(!matches_target("Office", "   "));
    }

    #[test]
    fn test_association_classification() {
        let off = Observation { wireless_active: false, network_name: None };
        assert_eq!(off.association("Office"), Association::NotAssociated);

        let unknown = Observation { wireless_active: true, network_name: None };
        assert_eq!(unknown.association("Office"), Association::Indeterminate);

        let target = Observation { wireless_active: true, network_name: Some("Office".into()) };
        assert_eq!(target.association("office"), Association::Associated);

        let other = Observation { wireless_active: true, network_name: Some("Cafe".into()) };
        assert_eq!(other.association("Office"), Association::NotAssociated);
    }
}
