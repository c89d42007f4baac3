//! Alert kinds, their throttle state and the deliverable alerts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The independently throttled alert kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// The device lost its association with the target network.
    TargetLost,
    /// Reminder repeated while no wireless network is active.
    WifiOff,
    /// A different, named wireless network is active.
    WrongNetwork,
    /// The push webhook sent on disconnect and while Wi-Fi stays off.
    Webhook,
}

impl AlertKind {
    /// Stable identifier used in storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::TargetLost => "target_lost",
            AlertKind::WifiOff => "wifi_off",
            AlertKind::WrongNetwork => "wrong_network",
            AlertKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents the current throttling state for an alert kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrottleState {
    /// When this kind last fired.
    pub last_fired_at: DateTime<Utc>,
}

impl ThrottleState {
    /// Returns true if a new alert may fire at `now`, i.e. at least `window`
    /// has passed since the last firing.
    pub fn allows(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.last_fired_at >= window
    }
}

/// A concrete alert selected for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    /// Local notification: association with the target network was lost.
    TargetLost {
        /// The tracked network name.
        target: String,
    },
    /// Local notification: Wi-Fi is still off.
    WifiOff {
        /// The tracked network name.
        target: String,
    },
    /// Local notification: connected to a network other than the target.
    WrongNetwork {
        /// The name of the network currently active.
        current: String,
        /// The tracked network name.
        target: String,
    },
    /// Outbound webhook push.
    Webhook {
        /// Endpoint to POST to.
        url: String,
        /// Text content of the message.
        content: String,
    },
}

impl Alert {
    /// The throttle bucket this alert belongs to.
    pub fn kind(&self) -> AlertKind {
        match self {
            Alert::TargetLost { .. } => AlertKind::TargetLost,
            Alert::WifiOff { .. } => AlertKind::WifiOff,
            Alert::WrongNetwork { .. } => AlertKind::WrongNetwork,
            Alert::Webhook { .. } => AlertKind::Webhook,
        }
    }

    /// Title shown by local notifiers.
    pub fn title(&self) -> String {
        match self {
            Alert::TargetLost { target } => format!("Disconnected from {target}"),
            Alert::WifiOff { .. } => "Wi-Fi is not connected".to_string(),
            Alert::WrongNetwork { .. } => "Connected to the wrong Wi-Fi network".to_string(),
            Alert::Webhook { .. } => "Wi-Fi disconnected".to_string(),
        }
    }

    /// Body shown by local notifiers.
    pub fn body(&self) -> String {
        match self {
            Alert::TargetLost { target } => {
                format!("This device is no longer connected to {target}.")
            }
            Alert::WifiOff { target } => format!("Turn on Wi-Fi and join {target}."),
            Alert::WrongNetwork { current, target } => {
                format!("Connected to {current}, expected {target}.")
            }
            Alert::Webhook { content, .. } => content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_throttle_window_boundary() {
        let fired = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let state = ThrottleState { last_fired_at: fired };
        let window = chrono::Duration::seconds(30);

        assert!(!state.allows(fired, window));
        assert!(!state.allows(fired + chrono::Duration::seconds(29), window));
        assert!(state.allows(fired + chrono::Duration::seconds(30), window));
    }

    #[test]
    fn test_alert_kind_mapping() {
        let alert = Alert::WrongNetwork { current: "Cafe".into(), target: "Office".into() };
        assert_eq!(alert.kind(), AlertKind::WrongNetwork);
        assert_eq!(alert.body(), "Connected to Cafe, expected Office.");
        assert_eq!(AlertKind::Webhook.to_string(), "webhook");
        assert_eq!(AlertKind::WifiOff.to_string(), "wifi_off");
    }
}
