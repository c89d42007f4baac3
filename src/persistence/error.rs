//! Error type of the state store.

use thiserror::Error;

/// Errors returned by a [`KeyValueStore`](super::traits::KeyValueStore).
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The database rejected or failed a read, write or transaction.
    #[error("State store operation failed: {0}")]
    OperationFailed(String),

    /// A stored value does not decode as the requested type, or a value
    /// could not be encoded.
    #[error("Malformed state value: {0}")]
    SerializationError(String),

    /// The schema could not be brought up to date.
    #[error("Schema migration failed: {0}")]
    MigrationError(String),

    /// A database URL or PRAGMA argument was rejected before reaching the
    /// database.
    #[error("Invalid store input: {0}")]
    InvalidInput(String),
}
