//! This module provides a concrete implementation of the KeyValueStore using
//! SQLite.

use std::{str::FromStr, time::Duration};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};

pub mod key_value_store;
mod transaction;

use crate::persistence::error::PersistenceError;

/// A concrete implementation of the KeyValueStore using SQLite.
pub struct SqliteStateRepository {
    /// The SQLite connection pool used for database operations.
    pool: SqlitePool,
}

impl SqliteStateRepository {
    /// Creates a new instance of SqliteStateRepository with the provided
    /// database URL. This will create the database file if it does not
    /// exist.
    #[tracing::instrument(level = "info")]
    pub async fn new(database_url: &str) -> Result<Self, PersistenceError> {
        tracing::debug!(database_url, "Attempting to connect to SQLite database.");
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| PersistenceError::InvalidInput(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            PersistenceError::OperationFailed(format!("Failed to connect to database: {}", e))
        })?;
        tracing::info!(database_url, "Successfully connected to SQLite database.");
        Ok(Self { pool })
    }

    /// Runs database migrations.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn run_migrations(&self) -> Result<(), PersistenceError> {
        tracing::debug!("Running database migrations.");
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run database migrations.");
            PersistenceError::MigrationError(e.to_string())
        })?;
        tracing::info!("Database migrations completed successfully.");
        Ok(())
    }

    /// Ensures all pending writes are flushed to the main database file.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        tracing::debug!("Flushing pending writes to disk.");

        self.set_synchronous_mode("FULL").await?;
        self.checkpoint_wal("TRUNCATE").await?;
        self.set_synchronous_mode("NORMAL").await?;

        tracing::debug!("Pending writes flushed successfully.");
        Ok(())
    }

    /// Closes the connection pool gracefully.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn close(&self) {
        tracing::debug!("Closing SQLite connection pool.");
        self.pool.close().await;
        tracing::info!("SQLite connection pool closed successfully.");
    }

    /// Internal helper to execute a PRAGMA command with error handling
    async fn execute_pragma(&self, pragma: &str, operation: &str) -> Result<(), PersistenceError> {
        sqlx::query(pragma)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, pragma = %pragma, operation = %operation, "Failed to execute PRAGMA command.");
                PersistenceError::OperationFailed(e.to_string())
            })?;
        Ok(())
    }

    /// Performs a WAL checkpoint with the specified mode
    async fn checkpoint_wal(&self, mode: &str) -> Result<(), PersistenceError> {
        let allowed_modes = ["PASSIVE", "TRUNCATE", "RESTART"];
        if !allowed_modes.contains(&mode) {
            return Err(PersistenceError::InvalidInput(format!(
                "Invalid WAL checkpoint mode: {}",
                mode
            )));
        }
        let pragma = format!("PRAGMA wal_checkpoint({mode})");
        self.execute_pragma(&pragma, &format!("WAL checkpoint {mode}")).await
    }

    /// Sets the synchronous mode
    async fn set_synchronous_mode(&self, mode: &str) -> Result<(), PersistenceError> {
        let allowed_modes = ["OFF", "NORMAL", "FULL"];
        if !allowed_modes.contains(&mode) {
            return Err(PersistenceError::InvalidInput(format!(
                "Invalid synchronous mode: {}",
                mode
            )));
        }
        let pragma = format!("PRAGMA synchronous = {mode}");
        self.execute_pragma(&pragma, &format!("set synchronous mode to {mode}")).await
    }

    /// Helper to execute database queries with consistent error handling
    async fn execute_query_with_error_handling<F, T, E>(
        &self,
        operation: &str,
        query_fn: F,
    ) -> Result<T, PersistenceError>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        query_fn.await.map_err(|e| {
            tracing::error!(error = %e, operation = %operation, "Database operation failed.");
            PersistenceError::OperationFailed(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::persistence::traits::{KeyValueStore, StateBatch};

    async fn setup_file_db(dir: &tempfile::TempDir) -> SqliteStateRepository {
        let url = format!("sqlite:{}", dir.path().join("state.db").display());
        let repo = SqliteStateRepository::new(&url).await.expect("Failed to open file db");
        repo.run_migrations().await.expect("Failed to run migrations");
        repo
    }

    async fn setup_test_db() -> SqliteStateRepository {
        let repo = SqliteStateRepository::new("sqlite::memory:")
            .await
            .expect("Failed to connect to in-memory db");
        repo.run_migrations().await.expect("Failed to run migrations");
        repo
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestJsonState {
        counter: u64,
        label: String,
    }

    #[tokio::test]
    async fn test_json_state_persistence() {
        let repo = setup_test_db().await;
        let key = "test_state";

        // Initially absent
        let retrieved: Option<TestJsonState> = repo.get_json_state(key).await.unwrap();
        assert!(retrieved.is_none());

        let original_state = TestJsonState { counter: 1, label: "first".to_string() };
        repo.set_json_state(key, &original_state).await.unwrap();
        let retrieved_state: Option<TestJsonState> = repo.get_json_state(key).await.unwrap();
        assert_eq!(retrieved_state, Some(original_state));

        // Overwrite
        let updated_state = TestJsonState { counter: 2, label: "second".to_string() };
        repo.set_json_state(key, &updated_state).await.unwrap();
        let retrieved_updated: Option<TestJsonState> = repo.get_json_state(key).await.unwrap();
        assert_eq!(retrieved_updated, Some(updated_state));
    }

    #[tokio::test]
    async fn test_malformed_json_state_is_a_serialization_error() {
        let repo = setup_test_db().await;
        let mut batch = StateBatch::new();
        batch.set_raw("broken", "{not json".to_string());
        repo.commit_batch(batch).await.unwrap();

        let result = repo.get_json_state::<TestJsonState>("broken").await;
        assert!(matches!(result, Err(PersistenceError::SerializationError(_))));

        // The raw value is still readable
        let raw = repo.get_raw_state("broken").await.unwrap();
        assert_eq!(raw.as_deref(), Some("{not json"));
    }

    #[tokio::test]
    async fn test_prefix_listing_is_ordered_and_exact() {
        let repo = setup_test_db().await;
        repo.set_json_state("daily:2024-01-02", &2u64).await.unwrap();
        repo.set_json_state("daily:2024-01-01", &1u64).await.unwrap();
        repo.set_json_state("dailyx:2024-01-03", &3u64).await.unwrap();
        repo.set_json_state("session:last_rx", &4u64).await.unwrap();

        let states = repo.get_all_raw_states_by_prefix("daily:").await.unwrap();
        let keys: Vec<&str> = states.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["daily:2024-01-01", "daily:2024-01-02"]);
        assert_eq!(states[0].1, "1");
    }

    #[tokio::test]
    async fn test_remove_state() {
        let repo = setup_test_db().await;
        repo.set_json_state("k", &true).await.unwrap();
        repo.remove_state("k").await.unwrap();
        assert_eq!(repo.get_raw_state("k").await.unwrap(), None);

        // Removing a missing key is fine
        repo.remove_state("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_batch_applies_writes_in_order() {
        let repo = setup_test_db().await;
        repo.set_json_state("a", &1u64).await.unwrap();

        let mut batch = StateBatch::new();
        batch.set_json("a", &2u64).unwrap().set_json("b", &"x").unwrap().remove("a");
        repo.commit_batch(batch).await.unwrap();

        assert_eq!(repo.get_raw_state("a").await.unwrap(), None);
        assert_eq!(repo.get_json_state::<String>("b").await.unwrap(), Some("x".to_string()));
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let repo = setup_test_db().await;
        repo.commit_batch(StateBatch::new()).await.unwrap();
        assert!(repo.get_all_raw_states_by_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_keeps_data() {
        let repo = setup_test_db().await;
        repo.set_json_state("k", &100u64).await.unwrap();

        repo.flush().await.unwrap();

        assert_eq!(repo.get_json_state::<u64>("k").await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_pragma_helpers_reject_unknown_modes() {
        let repo = setup_test_db().await;

        assert!(matches!(
            repo.checkpoint_wal("BOGUS").await,
            Err(PersistenceError::InvalidInput(_))
        ));
        assert!(matches!(
            repo.set_synchronous_mode("EXTRA").await,
            Err(PersistenceError::InvalidInput(_))
        ));
        repo.checkpoint_wal("PASSIVE").await.unwrap();
        repo.set_synchronous_mode("NORMAL").await.unwrap();
    }

    #[tokio::test]
    async fn test_exclusive_transaction_commit() {
        let repo = setup_test_db().await;
        repo.set_json_state("counter", &1u64).await.unwrap();

        let mut tx = repo.begin_exclusive().await.unwrap();
        assert_eq!(tx.get_raw_state("counter").await.unwrap().as_deref(), Some("1"));
        let mut batch = StateBatch::new();
        batch.set_json("counter", &2u64).unwrap().remove("missing");
        tx.commit(batch).await.unwrap();

        assert_eq!(repo.get_json_state::<u64>("counter").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_dropped_exclusive_transaction_releases_lock() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo = setup_file_db(&dir).await;
        repo.set_json_state("counter", &1u64).await.unwrap();

        let tx = repo.begin_exclusive().await.unwrap();
        drop(tx);

        repo.set_json_state("counter", &5u64).await.unwrap();
        assert_eq!(repo.get_json_state::<u64>("counter").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_exclusive_transactions_serialize_across_pools() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = setup_file_db(&dir).await;
        let second = setup_file_db(&dir).await;
        first.set_json_state("counter", &0u64).await.unwrap();

        // Read-increment-write from two independent pools, interleaved.
        async fn increment(repo: &SqliteStateRepository) {
            let mut tx = repo.begin_exclusive().await.unwrap();
            let current: u64 = tx
                .get_raw_state("counter")
                .await
                .unwrap()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(0);
            tokio::task::yield_now().await;
            let mut batch = StateBatch::new();
            batch.set_json("counter", &(current + 1)).unwrap();
            tx.commit(batch).await.unwrap();
        }

        for _ in 0..10 {
            tokio::join!(increment(&first), increment(&second));
        }

        assert_eq!(second.get_json_state::<u64>("counter").await.unwrap(), Some(20));
    }
}
