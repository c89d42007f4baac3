//! This module provides the `SupervisorBuilder` for constructing a `Supervisor`.

use std::sync::Arc;

use super::{Supervisor, SupervisorError};
use crate::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    engine::{alert_policy::AlertPolicy, check::CheckRunner},
    ledger::SessionLedger,
    notification::{AlertDispatcher, LocalNotifier, WebhookNotifier, local_notifier_for},
    observer::ConnectivityObserver,
    persistence::traits::KeyValueStore,
    settings::SettingsStore,
};

/// A builder for creating a `Supervisor` instance.
pub struct SupervisorBuilder<T: KeyValueStore + 'static> {
    config: Option<AppConfig>,
    state: Option<Arc<T>>,
    observer: Option<Arc<dyn ConnectivityObserver>>,
    clock: Option<Arc<dyn Clock>>,
    local_notifier: Option<Arc<dyn LocalNotifier>>,
}

impl<T: KeyValueStore + 'static> Default for SupervisorBuilder<T> {
    fn default() -> Self {
        Self { config: None, state: None, observer: None, clock: None, local_notifier: None }
    }
}

impl<T: KeyValueStore + 'static> SupervisorBuilder<T> {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application configuration for the `Supervisor`.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the state repository for the `Supervisor`.
    pub fn state(mut self, state: Arc<T>) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the connectivity observer for the `Supervisor`.
    pub fn observer(mut self, observer: Arc<dyn ConnectivityObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Overrides the wall clock. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Overrides the local notifier. Defaults to the backend selected in the
    /// configuration.
    pub fn local_notifier(mut self, local_notifier: Arc<dyn LocalNotifier>) -> Self {
        self.local_notifier = Some(local_notifier);
        self
    }

    /// Assembles the services and builds a `Supervisor`.
    ///
    /// Configured default settings are written to the store here, before the
    /// first check can read them.
    pub async fn build(self) -> Result<Supervisor<T>, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;
        let state = self.state.ok_or(SupervisorError::MissingStateRepository)?;
        let observer = self.observer.ok_or(SupervisorError::MissingObserver)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let local_notifier =
            self.local_notifier.unwrap_or_else(|| local_notifier_for(config.local_notifier));

        let settings = Arc::new(SettingsStore::new(Arc::clone(&state)));
        settings.seed_defaults(&config.defaults).await?;

        let ledger =
            Arc::new(SessionLedger::new(Arc::clone(&state), Arc::clone(&clock), Arc::clone(&observer)));
        let policy = Arc::new(AlertPolicy::new(
            Arc::clone(&state),
            clock,
            config.throttle_window,
            config.webhook_message.clone(),
        ));
        let webhook = Arc::new(WebhookNotifier::new(config.webhook_timeout)?);
        let dispatcher = Arc::new(AlertDispatcher::new(local_notifier, webhook));

        let runner = Arc::new(CheckRunner::new(observer, settings, ledger, policy, dispatcher));
        tracing::debug!("Supervisor services wired.");

        Ok(Supervisor::new(config, runner))
    }
}
