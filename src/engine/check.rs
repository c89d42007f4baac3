//! One complete check: observe, account, decide, deliver.

use std::sync::Arc;

use thiserror::Error;

use super::alert_policy::{AlertInput, AlertPolicy};
use crate::{
    ledger::{CheckTransition, LedgerError, SessionLedger},
    models::{Alert, AlertKind},
    notification::AlertDispatcher,
    observer::{Association, ConnectivityObserver, Observation},
    persistence::traits::KeyValueStore,
    settings::{SettingsError, SettingsStore},
};

/// Errors that abort a check.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The ledger could not record the observation.
    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),

    /// The settings could not be loaded.
    #[error("Settings error: {0}")]
    SettingsError(#[from] SettingsError),
}

/// What a single check observed and decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// The platform observation, `None` if the query failed.
    pub observation: Option<Observation>,
    /// The ledger's transition.
    pub transition: CheckTransition,
    /// Kinds of the alerts handed to the dispatcher.
    pub alerts: Vec<AlertKind>,
}

/// Runs checks. Safe to call from any number of triggers concurrently.
pub struct CheckRunner<T: KeyValueStore> {
    observer: Arc<dyn ConnectivityObserver>,
    settings: Arc<SettingsStore<T>>,
    ledger: Arc<SessionLedger<T>>,
    policy: Arc<AlertPolicy<T>>,
    dispatcher: Arc<AlertDispatcher>,
}

impl<T: KeyValueStore> CheckRunner<T> {
    /// Creates a runner from its collaborators.
    pub fn new(
        observer: Arc<dyn ConnectivityObserver>,
        settings: Arc<SettingsStore<T>>,
        ledger: Arc<SessionLedger<T>>,
        policy: Arc<AlertPolicy<T>>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self { observer, settings, ledger, policy, dispatcher }
    }

    /// The dispatcher delivering this runner's alerts.
    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    /// Runs one check. Alert deliveries are started but not awaited.
    ///
    /// A failed platform query is treated as an indeterminate observation:
    /// the ledger keeps its last known state and no alert is raised.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn run_once(&self) -> Result<CheckOutcome, CheckError> {
        let settings = self.settings.load().await?;

        let observation = match self.observer.observe().await {
            Ok(observation) => Some(observation),
            Err(e) => {
                tracing::warn!(error = %e, "Connectivity query failed, keeping last known state.");
                None
            }
        };

        let association = match &observation {
            Some(observation) => observation.association(&settings.target_network_name),
            None => Association::Indeterminate,
        };
        let transition = self.ledger.check_association(association).await?;

        if transition.just_disconnected {
            tracing::info!(network = %settings.target_network_name, "Target network lost.");
        }

        let alerts = match observation.clone() {
            Some(observation) => {
                let input = AlertInput {
                    transition,
                    wireless_active: observation.wireless_active,
                    network_name: observation.network_name,
                    settings,
                };
                self.policy.evaluate(&input).await
            }
            None => Vec::new(),
        };

        let kinds = alerts.iter().map(Alert::kind).collect();
        self.dispatcher.dispatch(alerts);

        Ok(CheckOutcome { observation, transition, alerts: kinds })
    }
}
