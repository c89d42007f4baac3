//! Persisted state of the (at most one) open association session.

use serde::Serialize;

/// Cumulative device-wide traffic counters since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficTotals {
    /// Bytes received.
    pub rx_bytes: u64,
    /// Bytes transmitted.
    pub tx_bytes: u64,
}

impl TrafficTotals {
    /// Creates a counter snapshot.
    pub fn new(rx_bytes: u64, tx_bytes: u64) -> Self {
        Self { rx_bytes, tx_bytes }
    }
}

/// The singleton session record, reloaded from storage on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Session start in epoch milliseconds; `None` iff no session is open.
    pub connected_at: Option<i64>,
    /// Time of the last accounting flush in epoch milliseconds.
    pub last_sample_at: i64,
    /// Counter snapshot taken at the last flush.
    pub last_snapshot: TrafficTotals,
    /// The last externally observed association flag.
    pub was_target_connected: bool,
}

impl SessionState {
    /// Returns true while a session is open.
    pub fn is_open(&self) -> bool {
        self.connected_at.is_some()
    }

    /// Whole seconds elapsed since the last flush, never negative.
    pub fn unflushed_seconds(&self, now_ms: i64) -> u64 {
        if !self.is_open() {
            return 0;
        }
        u64::try_from(now_ms.saturating_sub(self.last_sample_at) / 1000).unwrap_or(0)
    }

    /// Counter growth since the last flush. A counter that went backwards
    /// (e.g. after a reboot) contributes nothing.
    pub fn traffic_delta(&self, current: TrafficTotals) -> TrafficTotals {
        TrafficTotals {
            rx_bytes: current.rx_bytes.saturating_sub(self.last_snapshot.rx_bytes),
            tx_bytes: current.tx_bytes.saturating_sub(self.last_snapshot.tx_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session(last_sample_at: i64) -> SessionState {
        SessionState {
            connected_at: Some(0),
            last_sample_at,
            last_snapshot: TrafficTotals::new(1000, 500),
            was_target_connected: true,
        }
    }

    #[test]
    fn test_unflushed_seconds_truncates() {
        assert_eq!(open_session(1_000).unflushed_seconds(62_999), 61);
    }

    #[test]
    fn test_unflushed_seconds_clamps_backwards_clock() {
        assert_eq!(open_session(10_000).unflushed_seconds(5_000), 0);
    }

    #[test]
    fn test_unflushed_seconds_closed_session() {
        let state = SessionState { last_sample_at: 0, ..Default::default() };
        assert_eq!(state.unflushed_seconds(100_000), 0);
    }

    #[test]
    fn test_traffic_delta_clamps_regression() {
        let delta = open_session(0).traffic_delta(TrafficTotals::new(10, 700));
        assert_eq!(delta, TrafficTotals::new(0, 200));
    }
}
