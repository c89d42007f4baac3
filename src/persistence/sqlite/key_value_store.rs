//! Implementation of the KeyValueStore trait for SqliteStateRepository

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::Row;

use crate::persistence::{
    error::PersistenceError,
    sqlite::{SqliteStateRepository, transaction::SqliteStateTransaction},
    traits::{KeyValueStore, StateBatch, StateTransaction, StateWrite},
};

pub(super) mod state_sql {
    pub const SELECT_VALUE: &str = "SELECT value FROM application_state WHERE key = ?";

    pub const SELECT_BY_PREFIX: &str =
        "SELECT key, value FROM application_state WHERE substr(key, 1, length(?)) = ? ORDER BY key";

    pub const UPSERT_VALUE: &str = "INSERT INTO application_state (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP";

    pub const DELETE_KEY: &str = "DELETE FROM application_state WHERE key = ?";
}

#[async_trait]
impl KeyValueStore for SqliteStateRepository {
    /// Retrieves a JSON-serializable state object by its key.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_json_state<T: DeserializeOwned + Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PersistenceError> {
        match self.get_raw_state(key).await? {
            Some(value_str) => serde_json::from_str(&value_str)
                .map(Some)
                .map_err(|e| PersistenceError::SerializationError(e.to_string())),
            None => Ok(None),
        }
    }

    /// Sets or updates a JSON-serializable state object by its key.
    #[tracing::instrument(skip(self, value), level = "debug")]
    async fn set_json_state<T: Serialize + Send + Sync + 'static>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), PersistenceError> {
        tracing::debug!(key, "Attempting to set JSON state.");

        let value_str = serde_json::to_string(value)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;

        self.execute_query_with_error_handling(
            "set JSON state",
            sqlx::query(state_sql::UPSERT_VALUE).bind(key).bind(value_str).execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_raw_state(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        tracing::debug!(key, "Attempting to retrieve state.");

        let row = self
            .execute_query_with_error_handling(
                "get state",
                sqlx::query(state_sql::SELECT_VALUE).bind(key).fetch_optional(&self.pool),
            )
            .await?;

        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_all_raw_states_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, String)>, PersistenceError> {
        tracing::debug!(prefix, "Attempting to retrieve all states by prefix.");

        let rows = self
            .execute_query_with_error_handling(
                "get all states by prefix",
                sqlx::query(state_sql::SELECT_BY_PREFIX)
                    .bind(prefix)
                    .bind(prefix)
                    .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn remove_state(&self, key: &str) -> Result<(), PersistenceError> {
        self.execute_query_with_error_handling(
            "remove state",
            sqlx::query(state_sql::DELETE_KEY).bind(key).execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, batch), fields(writes = batch.writes().len()), level = "debug")]
    async fn commit_batch(&self, batch: StateBatch) -> Result<(), PersistenceError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.execute_query_with_error_handling("begin batch", self.pool.begin()).await?;

        for write in batch.writes() {
            let result = match write {
                StateWrite::Set { key, value } => {
                    sqlx::query(state_sql::UPSERT_VALUE).bind(key).bind(value).execute(&mut *tx).await
                }
                StateWrite::Remove { key } => {
                    sqlx::query(state_sql::DELETE_KEY).bind(key).execute(&mut *tx).await
                }
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "Batch write failed, rolling back.");
                return Err(PersistenceError::OperationFailed(e.to_string()));
            }
        }

        self.execute_query_with_error_handling("commit batch", tx.commit()).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn begin_exclusive(&self) -> Result<Box<dyn StateTransaction>, PersistenceError> {
        let tx = self
            .execute_query_with_error_handling(
                "begin exclusive transaction",
                self.pool.begin_with("BEGIN IMMEDIATE"),
            )
            .await?;
        Ok(Box::new(SqliteStateTransaction::new(tx)))
    }
}
