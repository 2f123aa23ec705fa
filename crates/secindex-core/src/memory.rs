//! In-memory host: a content site with local roles and a recording search
//! index.
//!
//! Used by the benchmark binary and the integration tests; also a working
//! reference for hosts wiring their own collaborators.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, SecIndexError};
use crate::host::{Catalog, CatalogEntry, ContentRef, Indexable, PermissionAuthority, SearchIndex};
use crate::path::{ContentPath, IntoContentPath};
use crate::token::PermissionSet;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Debug, Default)]
struct SiteItem {
    local_roles: PermissionSet,
    block_inherit_roles: bool,
    indexable: bool,
}

/// A content tree with local role grants and inheritance blocking.
///
/// The effective permission set of an item is the union of its own local
/// roles and those of its ancestors, up to and including the nearest item
/// that blocks inheritance. The root always exists; roles granted on it are
/// site-wide unless blocked.
pub struct InMemorySite {
    items: RwLock<BTreeMap<ContentPath, SiteItem>>,
    failing: RwLock<BTreeSet<ContentPath>>,
    fetches: AtomicU64,
}

impl Default for InMemorySite {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySite {
    /// An empty site holding only the root.
    pub fn new() -> Self {
        let mut items = BTreeMap::new();
        items.insert(
            ContentPath::root(),
            SiteItem {
                indexable: false,
                ..SiteItem::default()
            },
        );
        Self {
            items: RwLock::new(items),
            failing: RwLock::new(BTreeSet::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Adds an indexable item without local roles. Missing ancestors are
    /// not created; they simply contribute nothing.
    pub fn add(&self, path: impl IntoContentPath) -> Result<ContentRef> {
        let path = path.into_content_path()?;
        if path.is_root() {
            return Err(SecIndexError::RootImmutable("add"));
        }
        write(&self.items).insert(
            path.clone(),
            SiteItem {
                indexable: true,
                ..SiteItem::default()
            },
        );
        Ok(ContentRef::new(path))
    }

    /// Grants a local role on an item.
    pub fn grant(&self, path: impl IntoContentPath, role: &str) -> Result<()> {
        self.modify(path, |item| {
            item.local_roles.insert(role);
        })
    }

    /// Revokes a local role from an item.
    pub fn revoke(&self, path: impl IntoContentPath, role: &str) -> Result<()> {
        self.modify(path, |item| {
            item.local_roles.remove(role);
        })
    }

    /// Sets the inheritance block flag of an item.
    pub fn set_block(&self, path: impl IntoContentPath, block: bool) -> Result<()> {
        self.modify(path, |item| item.block_inherit_roles = block)
    }

    /// Marks an item as handled or ignored by the search index.
    pub fn set_indexable(&self, path: impl IntoContentPath, indexable: bool) -> Result<()> {
        self.modify(path, |item| item.indexable = indexable)
    }

    /// Removes an item and everything below it. Returns the number of
    /// items removed.
    pub fn remove(&self, path: impl IntoContentPath) -> Result<usize> {
        let path = path.into_content_path()?;
        if path.is_root() {
            return Err(SecIndexError::RootImmutable("remove"));
        }
        let mut items = write(&self.items);
        let before = items.len();
        items.retain(|p, _| !p.starts_with(&path));
        Ok(before - items.len())
    }

    /// Moves an item and everything below it to `to`.
    pub fn relocate(&self, from: impl IntoContentPath, to: impl IntoContentPath) -> Result<()> {
        let from = from.into_content_path()?;
        let to = to.into_content_path()?;
        if from.is_root() || to.is_root() {
            return Err(SecIndexError::RootImmutable("relocate"));
        }
        let mut items = write(&self.items);
        if !items.contains_key(&from) {
            return Err(SecIndexError::PathNotFound(from));
        }
        let moved: Vec<ContentPath> = items
            .keys()
            .filter(|p| p.starts_with(&from))
            .cloned()
            .collect();
        for old in moved {
            if let (Some(item), Some(new)) = (items.remove(&old), old.rebase(&from, &to)) {
                items.insert(new, item);
            }
        }
        Ok(())
    }

    /// Current state of an item as a [`ContentRef`].
    pub fn content(&self, path: impl IntoContentPath) -> Result<ContentRef> {
        let path = path.into_content_path()?;
        let items = read(&self.items);
        let item = items
            .get(&path)
            .ok_or_else(|| SecIndexError::PathNotFound(path.clone()))?;
        Ok(ContentRef {
            path,
            block_inherit_roles: item.block_inherit_roles,
            indexable: item.indexable,
        })
    }

    /// Number of items, root included.
    pub fn len(&self) -> usize {
        read(&self.items).len()
    }

    /// True if only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Effective permission sets served so far.
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Resets the fetch counter.
    pub fn reset_fetches(&self) {
        self.fetches.store(0, Ordering::Relaxed);
    }

    /// Makes every later lookup of `path` fail.
    pub fn fail_on(&self, path: impl IntoContentPath) -> Result<()> {
        let path = path.into_content_path()?;
        write(&self.failing).insert(path);
        Ok(())
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        write(&self.failing).clear();
    }

    fn modify(&self, path: impl IntoContentPath, f: impl FnOnce(&mut SiteItem)) -> Result<()> {
        let path = path.into_content_path()?;
        let mut items = write(&self.items);
        let item = items
            .get_mut(&path)
            .ok_or(SecIndexError::PathNotFound(path))?;
        f(item);
        Ok(())
    }
}

impl PermissionAuthority for InMemorySite {
    fn effective_permission_set(&self, path: &ContentPath) -> anyhow::Result<PermissionSet> {
        if read(&self.failing).contains(path) {
            anyhow::bail!("permission lookup refused for {}", path);
        }
        let items = read(&self.items);
        if !items.contains_key(path) {
            anyhow::bail!("no content at {}", path);
        }
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let mut effective = PermissionSet::new();
        let mut current = Some(path.clone());
        while let Some(p) = current {
            if let Some(item) = items.get(&p) {
                effective.union_with(&item.local_roles);
                if item.block_inherit_roles {
                    break;
                }
            }
            current = p.parent();
        }
        Ok(effective)
    }
}

impl Catalog for InMemorySite {
    fn entries(&self) -> anyhow::Result<Vec<CatalogEntry>> {
        let items = read(&self.items);
        Ok(items
            .iter()
            .filter(|(_, item)| item.indexable)
            .map(|(path, item)| CatalogEntry {
                path: path.clone(),
                block_inherit_roles: item.block_inherit_roles,
            })
            .collect())
    }
}

/// Search index that keeps the latest permission set per path and counts
/// updates.
#[derive(Default)]
pub struct RecordingIndex {
    entries: RwLock<BTreeMap<ContentPath, PermissionSet>>,
    log: RwLock<Vec<ContentPath>>,
    failing: RwLock<BTreeSet<ContentPath>>,
    updates: AtomicU64,
}

impl RecordingIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last permission set stored for `path`.
    pub fn indexed(&self, path: impl IntoContentPath) -> Option<PermissionSet> {
        let path = path.into_content_path().ok()?;
        read(&self.entries).get(&path).cloned()
    }

    /// Paths updated since the last [`reset`](Self::reset), in order.
    pub fn updated_paths(&self) -> Vec<ContentPath> {
        read(&self.log).clone()
    }

    /// Updates applied so far.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Clears the update log and counter; stored entries are kept.
    pub fn reset(&self) {
        write(&self.log).clear();
        self.updates.store(0, Ordering::Relaxed);
    }

    /// Makes every later update of `path` fail.
    pub fn fail_on(&self, path: impl IntoContentPath) -> Result<()> {
        let path = path.into_content_path()?;
        write(&self.failing).insert(path);
        Ok(())
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        write(&self.failing).clear();
    }
}

impl SearchIndex for RecordingIndex {
    fn apply_update(&self, item: &dyn Indexable, index_ids: &[String]) -> anyhow::Result<()> {
        let path = item.physical_path();
        if index_ids.is_empty() {
            anyhow::bail!("no index columns given for {}", path);
        }
        if read(&self.failing).contains(path) {
            anyhow::bail!("index rejected update for {}", path);
        }
        write(&self.entries).insert(path.clone(), item.allowed_roles_and_users().clone());
        write(&self.log).push(path.clone());
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
