//! Test doubles shared by unit and integration tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::{
    clock::Clock,
    models::TrafficTotals,
    notification::{LocalNotifier, error::NotificationError},
    observer::{ConnectivityObserver, Observation, ObserverError},
    persistence::sqlite::SqliteStateRepository,
};

/// Creates a migrated in-memory store.
pub async fn create_test_store() -> Arc<SqliteStateRepository> {
    let repo = SqliteStateRepository::new("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory db");
    repo.run_migrations().await.expect("Failed to run migrations");
    Arc::new(repo)
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    /// Creates a clock set to an RFC 3339 timestamp.
    pub fn new(rfc3339: &str) -> Self {
        let now = DateTime::parse_from_rfc3339(rfc3339).expect("Invalid RFC 3339 timestamp");
        Self { now: Mutex::new(now) }
    }

    /// Moves the clock forward by `seconds` (backwards if negative).
    pub fn advance_secs(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::seconds(seconds);
    }

    /// Moves the clock forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::milliseconds(millis);
    }

    /// Sets the clock to an RFC 3339 timestamp.
    pub fn set(&self, rfc3339: &str) {
        *self.now.lock().unwrap() =
            DateTime::parse_from_rfc3339(rfc3339).expect("Invalid RFC 3339 timestamp");
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap()
    }
}

/// An observer answering with scripted values.
#[derive(Debug)]
pub struct FakeObserver {
    observation: Mutex<Result<Observation, String>>,
    traffic: Mutex<TrafficTotals>,
}

impl Default for FakeObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeObserver {
    /// Starts with wireless off and zeroed counters.
    pub fn new() -> Self {
        Self {
            observation: Mutex::new(Ok(Observation::default())),
            traffic: Mutex::new(TrafficTotals::default()),
        }
    }

    /// Reports an active wireless network with the given name.
    pub fn connect_to(&self, name: &str) {
        *self.observation.lock().unwrap() =
            Ok(Observation { wireless_active: true, network_name: Some(name.to_string()) });
    }

    /// Reports an active wireless network whose name is unknown.
    pub fn connect_unnamed(&self) {
        *self.observation.lock().unwrap() =
            Ok(Observation { wireless_active: true, network_name: None });
    }

    /// Reports wireless off.
    pub fn disconnect(&self) {
        *self.observation.lock().unwrap() = Ok(Observation::default());
    }

    /// Makes every query fail.
    pub fn fail(&self, reason: &str) {
        *self.observation.lock().unwrap() = Err(reason.to_string());
    }

    /// Sets the cumulative counters.
    pub fn set_traffic(&self, rx_bytes: u64, tx_bytes: u64) {
        *self.traffic.lock().unwrap() = TrafficTotals::new(rx_bytes, tx_bytes);
    }

    /// Grows the cumulative counters.
    pub fn add_traffic(&self, rx_bytes: u64, tx_bytes: u64) {
        let mut traffic = self.traffic.lock().unwrap();
        traffic.rx_bytes += rx_bytes;
        traffic.tx_bytes += tx_bytes;
    }
}

#[async_trait]
impl ConnectivityObserver for FakeObserver {
    async fn observe(&self) -> Result<Observation, ObserverError> {
        self.observation.lock().unwrap().clone().map_err(|reason| ObserverError::CommandFailed {
            command: "fake".to_string(),
            reason,
        })
    }

    fn traffic_totals(&self) -> TrafficTotals {
        *self.traffic.lock().unwrap()
    }
}

/// A local notifier that records what it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier that accepts every notification.
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that rejects every notification.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// `(title, body)` of every accepted notification, in order.
    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }

    /// Number of delivery attempts, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalNotifier for RecordingNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), NotificationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NotificationError::NotifyFailed("notifications blocked".to_string()));
        }
        self.delivered.lock().unwrap().push((title.to_string(), body.to_string()));
        Ok(())
    }
}
