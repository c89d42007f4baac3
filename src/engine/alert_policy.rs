//! Alert policy module

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    clock::Clock,
    ledger::CheckTransition,
    models::{Alert, AlertKind, Settings, ThrottleState},
    observer::matches_target,
    persistence::{error::PersistenceError, keys, traits::KeyValueStore},
};

/// Errors that can occur within the AlertPolicy
#[derive(Debug, Error)]
pub enum AlertPolicyError {
    /// Error occurred in the state repository
    #[error("State repository error: {0}")]
    StateRepositoryError(#[from] PersistenceError),
}

/// Everything the policy looks at for one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertInput {
    /// The ledger's result for this check.
    pub transition: CheckTransition,
    /// Whether any wireless network is active.
    pub wireless_active: bool,
    /// The active network name, if known.
    pub network_name: Option<String>,
    /// The user settings in effect.
    pub settings: Settings,
}

/// Decides which alerts fire for a check and records when each kind last
/// fired. It is the only writer of the throttle state.
pub struct AlertPolicy<T: KeyValueStore> {
    /// The state repository for storing throttle states
    state_repository: Arc<T>,

    /// Source of the wall clock.
    clock: Arc<dyn Clock>,

    /// Minimum spacing between two firings of the same kind.
    throttle_window: chrono::Duration,

    /// Text content of the webhook push.
    webhook_message: String,

    /// A map of alert kinds to their locks to prevent race conditions.
    kind_locks: DashMap<AlertKind, Arc<Mutex<()>>>,
}

impl<T: KeyValueStore> AlertPolicy<T> {
    /// Creates a new AlertPolicy instance
    pub fn new(
        state_repository: Arc<T>,
        clock: Arc<dyn Clock>,
        throttle_window: Duration,
        webhook_message: String,
    ) -> Self {
        let throttle_window = chrono::Duration::from_std(throttle_window)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        Self {
            state_repository,
            clock,
            throttle_window,
            webhook_message,
            kind_locks: DashMap::new(),
        }
    }

    /// Returns the alerts that should be delivered for this check. The
    /// throttle state of every returned alert is already committed, so a
    /// later delivery failure never re-opens the window.
    ///
    /// Kinds are claimed one by one. A kind whose throttle state cannot be
    /// written is logged and dropped, and the kinds already claimed are
    /// still returned.
    pub async fn evaluate(&self, input: &AlertInput) -> Vec<Alert> {
        if !input.settings.check_enabled {
            tracing::debug!("Alerts disabled, skipping policy evaluation.");
            return Vec::new();
        }

        let mut fired = Vec::new();
        for alert in self.candidates(input) {
            let kind = alert.kind();
            match self.try_fire(kind).await {
                Ok(true) => fired.push(alert),
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        kind = %kind,
                        error = %e,
                        "Failed to claim throttle window, alert dropped."
                    );
                }
            }
        }
        fired
    }

    /// Alerts whose trigger condition holds, before throttling.
    ///
    /// The check that loses the target raises `TargetLost`. Every later
    /// check that still sees Wi-Fi off raises the `WifiOff` reminder. The
    /// webhook, when configured, covers both.
    fn candidates(&self, input: &AlertInput) -> Vec<Alert> {
        let target = input.settings.target_network_name.trim();
        let transition = &input.transition;
        let mut candidates = Vec::new();

        if transition.just_disconnected {
            candidates.push(Alert::TargetLost { target: target.to_string() });
        } else if !input.wireless_active {
            candidates.push(Alert::WifiOff { target: target.to_string() });
        }

        if transition.just_disconnected || !input.wireless_active {
            if let Some(url) = &input.settings.webhook_url {
                candidates.push(Alert::Webhook {
                    url: url.clone(),
                    content: self.webhook_message.clone(),
                });
            }
        }

        if input.wireless_active && !transition.associated {
            if let Some(current) = &input.network_name {
                if !matches_target(current, target) {
                    candidates.push(Alert::WrongNetwork {
                        current: current.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        candidates
    }

    /// Gets or creates a lock for a specific alert kind.
    fn get_kind_lock(&self, kind: AlertKind) -> Arc<Mutex<()>> {
        self.kind_locks.entry(kind).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Claims the throttle window of `kind`. Returns false while the kind is
    /// still cooling down.
    async fn try_fire(&self, kind: AlertKind) -> Result<bool, AlertPolicyError> {
        let lock = self.get_kind_lock(kind);
        let _guard = lock.lock().await;
        let throttle_state_key = throttle_state_key(kind);
        let current_time = self.clock.now().with_timezone(&Utc);

        let throttle_state = match self
            .state_repository
            .get_json_state::<ThrottleState>(&throttle_state_key)
            .await
        {
            Ok(state) => state,
            Err(e) => {
                // An unreadable state must not silence the alert forever.
                tracing::error!("Failed to retrieve throttle state for {}: {}", kind, e);
                None
            }
        };

        if let Some(state) = throttle_state {
            if !state.allows(current_time, self.throttle_window) {
                tracing::debug!(
                    "Throttling {} alert, last fired at {}.",
                    kind,
                    state.last_fired_at
                );
                return Ok(false);
            }
        }

        self.state_repository
            .set_json_state(&throttle_state_key, &ThrottleState { last_fired_at: current_time })
            .await?;
        tracing::info!(kind = %kind, "Alert fired.");
        Ok(true)
    }
}

/// Storage key of the throttle state of `kind`.
pub fn throttle_state_key(kind: AlertKind) -> String {
    format!("{}{}", keys::THROTTLE_PREFIX, kind)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mockall::predicate::eq;

    use super::*;
    use crate::{persistence::traits::MockKeyValueStore, test_helpers::ManualClock};

    const NOW: &str = "2024-05-01T10:00:00+00:00";

    fn settings(enabled: bool, webhook_url: Option<&str>) -> Settings {
        Settings {
            check_enabled: enabled,
            target_network_name: "Office".to_string(),
            webhook_url: webhook_url.map(str::to_string),
        }
    }

    fn disconnect_input(settings: Settings) -> AlertInput {
        AlertInput {
            transition: CheckTransition {
                just_disconnected: true,
                previously_associated: true,
                associated: false,
            },
            wireless_active: false,
            network_name: None,
            settings,
        }
    }

    fn create_policy(state_repo: MockKeyValueStore) -> AlertPolicy<MockKeyValueStore> {
        AlertPolicy::new(
            Arc::new(state_repo),
            Arc::new(ManualClock::new(NOW)),
            Duration::from_secs(30),
            "Reminder: Wi-Fi disconnected".to_string(),
        )
    }

    fn now_utc() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_checks_fire_nothing() {
        // No expectations: the store must not be touched.
        let state_repo = MockKeyValueStore::new();
        let policy = create_policy(state_repo);

        let alerts = policy.evaluate(&disconnect_input(settings(false, None))).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_target_lost_new_state() {
        let mut state_repo = MockKeyValueStore::new();

        state_repo
            .expect_get_json_state::<ThrottleState>()
            .with(eq("throttle_state:target_lost".to_string()))
            .times(1)
            .returning(|_| Ok(None));

        state_repo
            .expect_set_json_state::<ThrottleState>()
            .withf(|key, state| {
                key == "throttle_state:target_lost" && state.last_fired_at == now_utc()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let policy = create_policy(state_repo);

        let alerts = policy.evaluate(&disconnect_input(settings(true, None))).await;

        assert_eq!(alerts, vec![Alert::TargetLost { target: "Office".to_string() }]);
    }

    #[tokio::test]
    async fn test_target_lost_within_window_is_throttled() {
        let mut state_repo = MockKeyValueStore::new();

        state_repo
            .expect_get_json_state::<ThrottleState>()
            .with(eq("throttle_state:target_lost".to_string()))
            .times(1)
            .returning(|_| {
                Ok(Some(ThrottleState {
                    last_fired_at: now_utc() - chrono::Duration::seconds(29),
                }))
            });
        state_repo.expect_set_json_state::<ThrottleState>().times(0);

        let policy = create_policy(state_repo);

        let alerts = policy.evaluate(&disconnect_input(settings(true, None))).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_target_lost_after_window_fires_again() {
        let mut state_repo = MockKeyValueStore::new();

        state_repo
            .expect_get_json_state::<ThrottleState>()
            .times(1)
            .returning(|_| {
                Ok(Some(ThrottleState {
                    last_fired_at: now_utc() - chrono::Duration::seconds(30),
                }))
            });
        state_repo
            .expect_set_json_state::<ThrottleState>()
            .times(1)
            .returning(|_, _| Ok(()));

        let policy = create_policy(state_repo);

        let alerts = policy.evaluate(&disconnect_input(settings(true, None))).await;

        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_to_retrieve_state_still_fires() {
        let mut state_repo = MockKeyValueStore::new();

        state_repo
            .expect_get_json_state::<ThrottleState>()
            .times(1)
            .returning(|_| Err(PersistenceError::OperationFailed("DB error".to_string())));
        state_repo
            .expect_set_json_state::<ThrottleState>()
            .times(1)
            .returning(|_, _| Ok(()));

        let policy = create_policy(state_repo);

        let alerts = policy.evaluate(&disconnect_input(settings(true, None))).await;

        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_to_save_state_drops_that_alert() {
        let mut state_repo = MockKeyValueStore::new();

        state_repo.expect_get_json_state::<ThrottleState>().times(1).returning(|_| Ok(None));
        state_repo
            .expect_set_json_state::<ThrottleState>()
            .times(1)
            .returning(|_, _| Err(PersistenceError::OperationFailed("DB error".to_string())));

        let policy = create_policy(state_repo);

        let alerts = policy.evaluate(&disconnect_input(settings(true, None))).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_save_failure_keeps_claimed_target_lost() {
        let mut state_repo = MockKeyValueStore::new();

        state_repo
            .expect_get_json_state::<ThrottleState>()
            .with(eq("throttle_state:target_lost".to_string()))
            .times(1)
            .returning(|_| Ok(None));
        state_repo
            .expect_get_json_state::<ThrottleState>()
            .with(eq("throttle_state:webhook".to_string()))
            .times(1)
            .returning(|_| Ok(None));
        state_repo
            .expect_set_json_state::<ThrottleState>()
            .withf(|key, _| key == "throttle_state:target_lost")
            .times(1)
            .returning(|_, _| Ok(()));
        state_repo
            .expect_set_json_state::<ThrottleState>()
            .withf(|key, _| key == "throttle_state:webhook")
            .times(1)
            .returning(|_, _| Err(PersistenceError::OperationFailed("disk full".to_string())));

        let policy = create_policy(state_repo);

        let alerts = policy
            .evaluate(&disconnect_input(settings(true, Some("https://hooks.example.com/x"))))
            .await;

        assert_eq!(alerts, vec![Alert::TargetLost { target: "Office".to_string() }]);
    }

    #[tokio::test]
    async fn test_wifi_off_reminder_after_disconnect() {
        let mut state_repo = MockKeyValueStore::new();

        state_repo
            .expect_get_json_state::<ThrottleState>()
            .with(eq("throttle_state:wifi_off".to_string()))
            .times(1)
            .returning(|_| Ok(None));
        state_repo
            .expect_get_json_state::<ThrottleState>()
            .with(eq("throttle_state:webhook".to_string()))
            .times(1)
            .returning(|_| Ok(Some(ThrottleState { last_fired_at: now_utc() })));
        state_repo
            .expect_set_json_state::<ThrottleState>()
            .withf(|key, _| key == "throttle_state:wifi_off")
            .times(1)
            .returning(|_, _| Ok(()));

        let policy = create_policy(state_repo);
        let input = AlertInput {
            transition: CheckTransition {
                just_disconnected: false,
                previously_associated: false,
                associated: false,
            },
            ..disconnect_input(settings(true, Some("https://hooks.example.com/x")))
        };

        let alerts = policy.evaluate(&input).await;

        assert_eq!(alerts, vec![Alert::WifiOff { target: "Office".to_string() }]);
    }

    #[tokio::test]
    async fn test_webhook_throttled_independently() {
        let mut state_repo = MockKeyValueStore::new();

        // Target-lost is still cooling down, the webhook is not.
        state_repo
            .expect_get_json_state::<ThrottleState>()
            .with(eq("throttle_state:target_lost".to_string()))
            .times(1)
            .returning(|_| Ok(Some(ThrottleState { last_fired_at: now_utc() })));
        state_repo
            .expect_get_json_state::<ThrottleState>()
            .with(eq("throttle_state:webhook".to_string()))
            .times(1)
            .returning(|_| Ok(None));
        state_repo
            .expect_set_json_state::<ThrottleState>()
            .withf(|key, _| key == "throttle_state:webhook")
            .times(1)
            .returning(|_, _| Ok(()));

        let policy = create_policy(state_repo);

        let alerts = policy
            .evaluate(&disconnect_input(settings(true, Some("https://hooks.example.com/x"))))
            .await;

        assert_eq!(
            alerts,
            vec![Alert::Webhook {
                url: "https://hooks.example.com/x".to_string(),
                content: "Reminder: Wi-Fi disconnected".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_wrong_network_fires() {
        let mut state_repo = MockKeyValueStore::new();

        state_repo
            .expect_get_json_state::<ThrottleState>()
            .with(eq("throttle_state:wrong_network".to_string()))
            .times(1)
            .returning(|_| Ok(None));
        state_repo
            .expect_set_json_state::<ThrottleState>()
            .times(1)
            .returning(|_, _| Ok(()));

        let policy = create_policy(state_repo);
        let input = AlertInput {
            transition: CheckTransition {
                just_disconnected: false,
                previously_associated: false,
                associated: false,
            },
            wireless_active: true,
            network_name: Some("Cafe".to_string()),
            settings: settings(true, None),
        };

        let alerts = policy.evaluate(&input).await;

        assert_eq!(
            alerts,
            vec![Alert::WrongNetwork { current: "Cafe".to_string(), target: "Office".to_string() }]
        );
    }

    #[test]
    fn test_candidates_none_while_associated_or_unknown() {
        let policy = create_policy(MockKeyValueStore::new());
        let associated = CheckTransition {
            just_disconnected: false,
            previously_associated: true,
            associated: true,
        };

        let on_target = AlertInput {
            transition: associated,
            wireless_active: true,
            network_name: Some("Office".to_string()),
            settings: settings(true, Some("https://hooks.example.com/x")),
        };
        assert!(policy.candidates(&on_target).is_empty());

        let unknown_name = AlertInput { network_name: None, ..on_target };
        assert!(policy.candidates(&unknown_name).is_empty());
    }

    #[test]
    fn test_throttle_state_key() {
        assert_eq!(throttle_state_key(AlertKind::WrongNetwork), "throttle_state:wrong_network");
    }
}
