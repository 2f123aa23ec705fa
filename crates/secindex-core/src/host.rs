//! Collaborator interfaces implemented by the content-management host.
//!
//! The core never computes permissions or writes index entries itself. It
//! asks a [`PermissionAuthority`] for effective permission sets (the expensive
//! call it tries to avoid) and pushes [`Indexable`] entries to a
//! [`SearchIndex`] (the cheap call it batches).

use crate::path::ContentPath;
use crate::token::PermissionSet;

/// A content item whose security state may have changed.
pub trait ContentNode {
    /// Root-relative path of the item.
    fn path(&self) -> &ContentPath;

    /// Current local-role block setting of the item.
    fn block_inherit_roles(&self) -> bool;

    /// False for content the search index does not handle; such items are
    /// skipped without error.
    fn is_indexable(&self) -> bool {
        true
    }
}

/// Resolves effective permission sets.
pub trait PermissionAuthority: Send + Sync {
    /// Effective permission set of the item at `path`, including everything
    /// it inherits.
    fn effective_permission_set(&self, path: &ContentPath) -> anyhow::Result<PermissionSet>;
}

/// The minimum an index needs to store a node's access entry.
pub trait Indexable {
    /// Identity of the indexed item.
    fn physical_path(&self) -> &ContentPath;

    /// Permission set to store for it.
    fn allowed_roles_and_users(&self) -> &PermissionSet;
}

/// Stand-in for a content item that was not loaded: a path plus the
/// permission set fetched from a representative of its group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexableEntry {
    /// Path of the item being indexed.
    pub path: ContentPath,
    /// Permission set to index for it.
    pub permissions: PermissionSet,
}

impl IndexableEntry {
    /// Creates an entry.
    pub fn new(path: ContentPath, permissions: PermissionSet) -> Self {
        Self { path, permissions }
    }
}

impl Indexable for IndexableEntry {
    fn physical_path(&self) -> &ContentPath {
        &self.path
    }

    fn allowed_roles_and_users(&self) -> &PermissionSet {
        &self.permissions
    }
}

/// Access-control search index.
pub trait SearchIndex: Send + Sync {
    /// Stores the permission set of `item` in the named index columns.
    fn apply_update(&self, item: &dyn Indexable, index_ids: &[String]) -> anyhow::Result<()>;
}

/// One item known to the host's catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Path of the item.
    pub path: ContentPath,
    /// Its local-role block setting.
    pub block_inherit_roles: bool,
}

/// Enumerates all indexed content, for synchronisation and integrity checks.
pub trait Catalog {
    /// Every catalogued item. Order is not significant.
    fn entries(&self) -> anyhow::Result<Vec<CatalogEntry>>;
}

/// Plain [`ContentNode`] for hosts that have no richer content type at hand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentRef {
    /// Path of the item.
    pub path: ContentPath,
    /// Its local-role block setting.
    pub block_inherit_roles: bool,
    /// Whether the index handles it.
    pub indexable: bool,
}

impl ContentRef {
    /// An indexable item without a local-role block.
    pub fn new(path: ContentPath) -> Self {
        Self {
            path,
            block_inherit_roles: false,
            indexable: true,
        }
    }

    /// Sets the local-role block flag.
    pub fn with_block(mut self, block_inherit_roles: bool) -> Self {
        self.block_inherit_roles = block_inherit_roles;
        self
    }

    /// Marks the item as not indexable.
    pub fn not_indexable(mut self) -> Self {
        self.indexable = false;
        self
    }
}

impl ContentNode for ContentRef {
    fn path(&self) -> &ContentPath {
        &self.path
    }

    fn block_inherit_roles(&self) -> bool {
        self.block_inherit_roles
    }

    fn is_indexable(&self) -> bool {
        self.indexable
    }
}

impl From<&CatalogEntry> for ContentRef {
    fn from(entry: &CatalogEntry) -> Self {
        ContentRef::new(entry.path.clone()).with_block(entry.block_inherit_roles)
    }
}
