//! Persistent key-value storage.
//!
//! Everything Courier keeps across restarts lives behind [`Store`]: plain
//! string keys, hash records of string fields, and atomic counters. The
//! default backend is [`SqliteStore`]; [`MemoryStore`] serves tests and
//! throwaway runs.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::collections::HashMap;

/// Store failure. Callers treat every variant as "backend unreachable".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not complete the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Backend-agnostic persistent store.
///
/// Plain values, hash records and counters share one key space per kind;
/// `delete` removes a key from all of them.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads a plain value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a plain value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Writes a plain value only if the key is unset. Returns `true` when
    /// this call wrote it.
    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Removes a key. Missing keys are not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Reads every field of a hash record. Empty when the record is absent.
    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Replaces a hash record with exactly `fields`, atomically.
    async fn hash_replace(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()>;

    /// Atomically adds one to a counter and returns the new value.
    async fn increment(&self, key: &str) -> StoreResult<u64>;

    /// Reads a counter; absent counters are zero.
    async fn counter(&self, key: &str) -> StoreResult<u64>;

    /// Lists hash record keys starting with `prefix`, sorted.
    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

impl std::fmt::Debug for dyn Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Store")
    }
}
