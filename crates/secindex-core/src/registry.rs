//! Lifecycle of shadow trees, one per namespace.
//!
//! Trees are stored bincode-encoded under `shadowtree/{namespace}` in a
//! [`KvStore`]. The registry hands out a shared handle per namespace and
//! keeps returning that same handle until the namespace is deleted.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::error::{Result, SecIndexError};
use crate::kvstore::KvStore;
use crate::tree::ShadowTree;

/// Key prefix for persisted trees.
const TREE_PREFIX: &[u8] = b"shadowtree/";

/// Shared, lockable handle to one namespace's tree.
pub type SharedTree = Arc<RwLock<ShadowTree>>;

fn tree_key(namespace: &str) -> Vec<u8> {
    let mut key = TREE_PREFIX.to_vec();
    key.extend_from_slice(namespace.as_bytes());
    key
}

fn check_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(SecIndexError::Config(
            "namespace must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn encode(tree: &ShadowTree) -> Result<Vec<u8>> {
    bincode::serialize(tree).map_err(|e| SecIndexError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<ShadowTree> {
    bincode::deserialize(bytes).map_err(|e| SecIndexError::Serialization(e.to_string()))
}

/// Creates, caches, persists and deletes shadow trees.
pub struct ShadowTreeRegistry {
    kv: Arc<dyn KvStore>,
    roots: DashMap<String, SharedTree>,
}

impl ShadowTreeRegistry {
    /// Creates a registry over the given store.
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            roots: DashMap::new(),
        }
    }

    /// Returns the tree for `namespace`, loading it from the store or
    /// creating and storing an empty one on first use.
    pub fn root(&self, namespace: &str) -> Result<SharedTree> {
        check_namespace(namespace)?;
        match self.roots.entry(namespace.to_string()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                let key = tree_key(namespace);
                let tree = match self.kv.get(&key)? {
                    Some(bytes) => {
                        let tree = decode(&bytes)?;
                        debug!(namespace, nodes = tree.node_count(), "loaded shadow tree");
                        tree
                    }
                    None => {
                        let tree = ShadowTree::new();
                        self.kv.put(key, encode(&tree)?)?;
                        info!(namespace, "created shadow tree");
                        tree
                    }
                };
                let shared = Arc::new(RwLock::new(tree));
                e.insert(shared.clone());
                Ok(shared)
            }
        }
    }

    /// Writes the cached tree for `namespace` back to the store. Namespaces
    /// that were never opened are left alone.
    pub fn flush(&self, namespace: &str) -> Result<()> {
        let Some(shared) = self.roots.get(namespace).map(|r| r.value().clone()) else {
            return Ok(());
        };
        let bytes = {
            let tree = shared
                .read()
                .map_err(|e| SecIndexError::Storage(e.to_string()))?;
            encode(&tree)?
        };
        debug!(namespace, bytes = bytes.len(), "flushing shadow tree");
        self.kv.put(tree_key(namespace), bytes)
    }

    /// Drops the cached handle so the next [`root`](Self::root) reloads
    /// from the store. Unflushed changes are lost.
    pub fn evict(&self, namespace: &str) {
        self.roots.remove(namespace);
    }

    /// Removes the tree for `namespace` from the cache and the store.
    /// Deleting an absent tree is not an error.
    pub fn delete(&self, namespace: &str) -> Result<()> {
        self.roots.remove(namespace);
        let key = tree_key(namespace);
        if self.kv.contains_key(&key)? {
            self.kv.delete(&key)?;
            info!(namespace, "deleted shadow tree");
        }
        Ok(())
    }

    /// Namespaces with a tree in the store, sorted.
    pub fn namespaces(&self) -> Result<Vec<String>> {
        Ok(self
            .kv
            .keys_with_prefix(TREE_PREFIX)?
            .into_iter()
            .map(|k| String::from_utf8_lossy(&k[TREE_PREFIX.len()..]).into_owned())
            .collect())
    }
}
