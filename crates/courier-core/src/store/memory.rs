//! In-memory store backend.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{Store, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    values: HashMap<String, String>,
    hashes: BTreeMap<String, HashMap<String, String>>,
    counters: HashMap<String, u64>,
}

/// Store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock()?.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        if tables.values.contains_key(key) {
            return Ok(false);
        }
        tables.values.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut tables = self.lock()?;
        tables.values.remove(key);
        tables.hashes.remove(key);
        tables.counters.remove(key);
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(self.lock()?.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_replace(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        let record = fields
            .iter()
            .map(|(field, value)| ((*field).to_string(), value.clone()))
            .collect();
        let mut tables = self.lock()?;
        if fields.is_empty() {
            tables.hashes.remove(key);
        } else {
            tables.hashes.insert(key.to_string(), record);
        }
        Ok(())
    }

    async fn increment(&self, key: &str) -> StoreResult<u64> {
        let mut tables = self.lock()?;
        let counter = tables.counters.entry(key.to_string()).or_default();
        *counter += 1;
        Ok(*counter)
    }

    async fn counter(&self, key: &str) -> StoreResult<u64> {
        Ok(self.lock()?.counters.get(key).copied().unwrap_or_default())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()?
            .hashes
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_clears_every_kind() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        store.hash_replace("k", &[("f", "v".into())]).await.unwrap();
        store.increment("k").await.unwrap();

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.hash_get_all("k").await.unwrap().is_empty());
        assert_eq!(store.counter("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_hash_replace_removes_record() {
        let store = MemoryStore::new();
        store.hash_replace("h", &[("f", "v".into())]).await.unwrap();
        store.hash_replace("h", &[]).await.unwrap();
        assert!(store.keys_with_prefix("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_if_absent_and_counters() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "a").await.unwrap());
        assert!(!store.set_if_absent("k", "b").await.unwrap());
        assert_eq!(store.increment("c").await.unwrap(), 1);
        assert_eq!(store.increment("c").await.unwrap(), 2);
        assert_eq!(store.counter("c").await.unwrap(), 2);
    }
}
