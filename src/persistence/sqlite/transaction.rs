//! Exclusive write transactions over the SQLite store.

use async_trait::async_trait;
use sqlx::{Row, Sqlite, Transaction};

use super::key_value_store::state_sql;
use crate::persistence::{
    error::PersistenceError,
    traits::{StateBatch, StateTransaction, StateWrite},
};

/// A `BEGIN IMMEDIATE` transaction. The write lock is taken when the
/// transaction begins, so two transactions never read the same state and
/// then both write. Dropping it rolls back.
pub(crate) struct SqliteStateTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteStateTransaction {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }
}

fn operation_failed(operation: &str, e: sqlx::Error) -> PersistenceError {
    tracing::error!(error = %e, operation = %operation, "Database operation failed.");
    PersistenceError::OperationFailed(e.to_string())
}

#[async_trait]
impl StateTransaction for SqliteStateTransaction {
    async fn get_raw_state(&mut self, key: &str) -> Result<Option<String>, PersistenceError> {
        let row = sqlx::query(state_sql::SELECT_VALUE)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| operation_failed("get state in transaction", e))?;
        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    async fn commit(self: Box<Self>, batch: StateBatch) -> Result<(), PersistenceError> {
        let Self { mut tx } = *self;

        for write in batch.writes() {
            let result = match write {
                StateWrite::Set { key, value } => {
                    sqlx::query(state_sql::UPSERT_VALUE).bind(key).bind(value).execute(&mut *tx).await
                }
                StateWrite::Remove { key } => {
                    sqlx::query(state_sql::DELETE_KEY).bind(key).execute(&mut *tx).await
                }
            };
            // Returning drops `tx`, which rolls the whole transaction back.
            result.map_err(|e| operation_failed("write in transaction", e))?;
        }

        tx.commit().await.map_err(|e| operation_failed("commit transaction", e))
    }
}
