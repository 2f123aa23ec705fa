//! Key-value storage for persisted shadow trees.
//!
//! The registry keeps one serialized tree per namespace behind this trait.
//! Hosts plug in their own persistent store; [`MemoryKvStore`] is the
//! in-process implementation used by tests and the bench harness.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{Result, SecIndexError};

/// Key type for the KV store.
pub type Key = Vec<u8>;
/// Value type for the KV store.
pub type Value = Vec<u8>;

/// Byte-oriented key-value store.
pub trait KvStore: Send + Sync {
    /// Get a value by key. Returns None if the key doesn't exist.
    fn get(&self, key: &[u8]) -> Result<Option<Value>>;

    /// Put a key-value pair. Overwrites any existing value.
    fn put(&self, key: Key, value: Value) -> Result<()>;

    /// Delete a key. Returns Ok(()) even if the key didn't exist.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Returns true if the key exists.
    fn contains_key(&self, key: &[u8]) -> Result<bool>;

    /// All keys starting with `prefix`, in sorted order.
    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Key>>;
}

/// In-memory KV store backed by a BTreeMap.
#[derive(Default)]
pub struct MemoryKvStore {
    data: RwLock<BTreeMap<Key, Value>>,
}

impl MemoryKvStore {
    /// Creates a new empty in-memory KV store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> SecIndexError {
    SecIndexError::Storage(e.to_string())
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn put(&self, key: Key, value: Value) -> Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.remove(key);
        Ok(())
    }

    fn contains_key(&self, key: &[u8]) -> Result<bool> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.contains_key(key))
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Key>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .range::<Vec<u8>, _>(prefix.to_vec()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
