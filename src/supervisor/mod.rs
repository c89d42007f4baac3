//! The Supervisor module manages the lifecycle of the daemon.
//!
//! ## Responsibilities
//!
//! - **Initialization**: The `SupervisorBuilder` constructs and "wires" the
//!   settings, ledger, alert policy and delivery services together.
//! - **Scheduling**: The check loop runs one check immediately, then re-arms
//!   a single sleep of `check_interval` after each completed check. Missed
//!   ticks are never caught up, and a failed check is logged and retried on
//!   the next tick.
//! - **Graceful Shutdown**: It listens for shutdown signals (like Ctrl+C or
//!   SIGTERM), stops the loop and gives in-flight alert deliveries a bounded
//!   time to finish.

mod builder;

use std::{sync::Arc, time::Duration};

use builder::SupervisorBuilder;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    engine::check::CheckRunner,
    notification::error::NotificationError,
    persistence::traits::KeyValueStore,
    settings::SettingsError,
};

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// A state repository was not provided to the `SupervisorBuilder`.
    #[error("Missing state repository for Supervisor")]
    MissingStateRepository,

    /// A connectivity observer was not provided to the `SupervisorBuilder`.
    #[error("Missing connectivity observer for Supervisor")]
    MissingObserver,

    /// The default settings could not be seeded.
    #[error("Settings error: {0}")]
    SettingsError(#[from] SettingsError),

    /// A delivery backend could not be created.
    #[error("Notification error: {0}")]
    NotificationError(#[from] NotificationError),
}

/// The primary runtime manager for the daemon.
pub struct Supervisor<T: KeyValueStore + 'static> {
    /// Shared application configuration.
    config: Arc<AppConfig>,

    /// Runs the individual checks.
    runner: Arc<CheckRunner<T>>,

    /// A token used to signal a graceful shutdown to all supervised tasks.
    cancellation_token: CancellationToken,

    /// A set of all spawned tasks that the supervisor is actively managing.
    join_set: tokio::task::JoinSet<()>,
}

impl<T: KeyValueStore + 'static> Supervisor<T> {
    /// Creates a new Supervisor instance.
    ///
    /// This is typically called by the `SupervisorBuilder` after it has
    /// assembled all the necessary dependencies.
    pub fn new(config: AppConfig, runner: Arc<CheckRunner<T>>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            cancellation_token: CancellationToken::new(),
            join_set: tokio::task::JoinSet::new(),
        }
    }

    /// Returns a new `SupervisorBuilder` instance.
    pub fn builder() -> SupervisorBuilder<T> {
        SupervisorBuilder::<T>::new()
    }

    /// The check runner driven by this supervisor.
    pub fn runner(&self) -> &Arc<CheckRunner<T>> {
        &self.runner
    }

    /// A token that stops [`Supervisor::run`] when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Runs the check loop until a shutdown signal arrives or the
    /// cancellation token is cancelled.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let cancellation_token = self.cancellation_token.clone();

        // Spawn a task to listen for shutdown signals.
        self.join_set.spawn(async move {
            tokio::select! {
                _ = wait_for_shutdown_signal() => cancellation_token.cancel(),
                _ = cancellation_token.cancelled() => {}
            }
        });

        let runner = Arc::clone(&self.runner);
        let check_interval = self.config.check_interval;
        let loop_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            run_check_loop(runner, check_interval, loop_token).await;
        });

        tracing::info!(interval = ?check_interval, "Supervisor started.");

        loop {
            tokio::select! {
                maybe_result = self.join_set.join_next() => {
                    match maybe_result {
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!("A critical task failed: {:?}. Initiating shutdown.", e);
                            self.cancellation_token.cancel();
                        }
                        None => break,
                    }
                }
                _ = self.cancellation_token.cancelled() => break,
            }
        }

        // --- Graceful Shutdown ---

        self.join_set.shutdown().await;
        tracing::info!("All supervised tasks have completed.");

        let shutdown_timeout = self.config.shutdown_timeout;
        self.runner.dispatcher().drain(shutdown_timeout).await;

        tracing::info!("Supervisor shutdown complete.");
        Ok(())
    }
}

/// Runs one check now, then one check per `interval` until cancelled. The
/// next check is scheduled only after the previous one completed.
async fn run_check_loop<T: KeyValueStore + 'static>(
    runner: Arc<CheckRunner<T>>,
    interval: Duration,
    cancellation_token: CancellationToken,
) {
    loop {
        match runner.run_once().await {
            Ok(outcome) => tracing::debug!(
                associated = outcome.transition.associated,
                alerts = outcome.alerts.len(),
                "Check completed."
            ),
            Err(e) => tracing::error!("Check failed: {}", e),
        }

        tokio::select! {
            _ = cancellation_token.cancelled() => {
                tracing::info!("Check loop received shutdown signal.");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
async fn wait_for_shutdown_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler.");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
        _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
    }
}
