#![warn(missing_docs)]

//! secindex core library.
//!
//! Keeps a shadow tree mirroring a hierarchical content tree, where every
//! node carries a fingerprint (security token) of its effective permission
//! set. When an item's permissions change, [`SecurityReindexer`] reindexes
//! only the subtree that can actually be affected and fetches permissions
//! once per group of descendants sharing a token, instead of once per
//! descendant.

pub mod config;
pub mod error;
pub mod host;
pub mod integrity;
pub mod kvstore;
pub mod memory;
pub mod path;
pub mod registry;
pub mod reindex;
pub mod stats;
mod subscribers;
pub mod token;
pub mod tree;

pub use config::SecurityIndexConfig;
pub use error::{Result, SecIndexError};
pub use host::{
    Catalog, CatalogEntry, ContentNode, ContentRef, Indexable, IndexableEntry,
    PermissionAuthority, SearchIndex,
};
pub use integrity::{IntegrityInfo, SyncReport};
pub use kvstore::{KvStore, MemoryKvStore};
pub use memory::{InMemorySite, RecordingIndex};
pub use path::{ContentPath, IntoContentPath};
pub use registry::{ShadowTreeRegistry, SharedTree};
pub use reindex::SecurityReindexer;
pub use stats::{Propagation, ReindexOutcome, ReindexStatsSnapshot};
pub use token::{PermissionSet, SecurityToken};
pub use tree::{NodeId, ShadowNode, ShadowTree};
