//! This module contains the storage interface used by every stateful
//! component.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Serialize, de::DeserializeOwned};

use super::error::PersistenceError;

/// A single write inside a [`StateBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateWrite {
    /// Inserts or replaces the raw value of a key.
    Set {
        /// The key to write.
        key: String,
        /// The already encoded JSON value.
        value: String,
    },
    /// Deletes a key. Removing a missing key is not an error.
    Remove {
        /// The key to delete.
        key: String,
    },
}

/// An ordered group of writes committed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateBatch {
    writes: Vec<StateWrite>,
}

impl StateBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a JSON-encoded value for `key`.
    pub fn set_json<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
    ) -> Result<&mut Self, PersistenceError> {
        let value = serde_json::to_string(value)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
        self.writes.push(StateWrite::Set { key: key.to_string(), value });
        Ok(self)
    }

    /// Queues an already encoded value for `key`.
    pub fn set_raw(&mut self, key: &str, value: String) -> &mut Self {
        self.writes.push(StateWrite::Set { key: key.to_string(), value });
        self
    }

    /// Queues the removal of `key`.
    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.writes.push(StateWrite::Remove { key: key.to_string() });
        self
    }

    /// Returns true if nothing was queued.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Returns the queued writes in order.
    pub fn writes(&self) -> &[StateWrite] {
        &self.writes
    }
}

/// A write transaction holding the store's exclusive write lock.
///
/// Reads see the committed state at the time the lock was taken. Other
/// writers, in this process or another one, wait until the transaction is
/// committed or dropped. Dropping it without committing rolls it back.
#[async_trait]
pub trait StateTransaction: Send {
    /// Retrieves the undecoded value stored under a key.
    async fn get_raw_state(&mut self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Applies the writes of `batch` and releases the lock.
    async fn commit(self: Box<Self>, batch: StateBatch) -> Result<(), PersistenceError>;
}

/// A flat, durable key-value namespace holding JSON-encoded values.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieves a JSON-serializable state object by its key.
    async fn get_json_state<T: DeserializeOwned + Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PersistenceError>;

    /// Sets or updates a JSON-serializable state object by its key.
    async fn set_json_state<T: Serialize + Send + Sync + 'static>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), PersistenceError>;

    /// Retrieves the undecoded value stored under a key.
    async fn get_raw_state(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Retrieves every undecoded `(key, value)` pair whose key starts with
    /// `prefix`, ordered by key.
    async fn get_all_raw_states_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, String)>, PersistenceError>;

    /// Deletes a key.
    async fn remove_state(&self, key: &str) -> Result<(), PersistenceError>;

    /// Applies all writes of a batch in a single transaction.
    async fn commit_batch(&self, batch: StateBatch) -> Result<(), PersistenceError>;

    /// Takes the store's exclusive write lock, waiting for a concurrent
    /// writer to finish first.
    async fn begin_exclusive(&self) -> Result<Box<dyn StateTransaction>, PersistenceError>;
}
