//! Durable key-value storage for the ledger, the alert policy and the user
//! settings.

pub mod error;
pub mod keys;
pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStateRepository;
pub use traits::{KeyValueStore, StateBatch, StateTransaction, StateWrite};
