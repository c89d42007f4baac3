//! Command line subcommands other than the daemon itself.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    config::AppConfig,
    engine::check::CheckError,
    ledger::LedgerError,
    persistence::{error::PersistenceError, sqlite::SqliteStateRepository},
    settings::SettingsError,
    supervisor::SupervisorError,
};

pub mod report;
pub mod settings;
pub mod status;

pub use report::{ReportArgs, ReportPeriod};
pub use settings::SettingsCommand;

/// Errors surfaced by the command line.
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    /// The store could not be opened or read.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    /// The ledger failed.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    /// A settings change was rejected or failed.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    /// The daemon could not be assembled.
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),
    /// A one-shot check failed.
    #[error("Check error: {0}")]
    Check(#[from] CheckError),
    /// Output could not be serialized.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// A destructive command was not confirmed.
    #[error("Refusing to {0} without --yes")]
    NotConfirmed(&'static str),
}

/// Opens the configured store and applies pending migrations.
pub async fn open_store(config: &AppConfig) -> Result<Arc<SqliteStateRepository>, Error> {
    tracing::debug!(database_url = %config.database_url, "Initializing state repository...");
    let repo = Arc::new(SqliteStateRepository::new(&config.database_url).await?);
    repo.run_migrations().await?;
    tracing::debug!("Database migrations completed.");
    Ok(repo)
}
