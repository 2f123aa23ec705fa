//! Catalog synchronisation and shadow tree integrity checks.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

use crate::error::{Result, SecIndexError};
use crate::host::{Catalog, CatalogEntry};
use crate::path::ContentPath;
use crate::reindex::SecurityReindexer;
use crate::tree::{NodeId, ShadowTree};

/// Paths known to the shadow tree versus paths known to the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IntegrityInfo {
    /// Paths listed by the catalog.
    pub catalog_paths: BTreeSet<ContentPath>,
    /// Physical paths recorded in the shadow tree.
    pub shadowtree_paths: BTreeSet<ContentPath>,
}

impl IntegrityInfo {
    /// Compares every recorded path in `tree`, blocks ignored, with the
    /// catalog's entries. Nodes that never had their security recorded are
    /// not counted.
    pub fn collect(tree: &ShadowTree, catalog: &dyn Catalog) -> Result<Self> {
        let catalog_paths = catalog_entries(catalog)?
            .into_iter()
            .map(|entry| entry.path)
            .collect();
        let shadowtree_paths = tree
            .descendants(NodeId::ROOT, true)
            .filter_map(|id| tree.node(id).and_then(|n| n.physical_path()).cloned())
            .collect();
        Ok(Self {
            catalog_paths,
            shadowtree_paths,
        })
    }

    /// Number of catalogued paths.
    pub fn n_cataloged(&self) -> usize {
        self.catalog_paths.len()
    }

    /// Number of shadowed paths.
    pub fn n_shadowed(&self) -> usize {
        self.shadowtree_paths.len()
    }

    /// True if both sides know exactly the same paths.
    pub fn is_integral(&self) -> bool {
        self.catalog_paths == self.shadowtree_paths
    }

    /// Catalogued paths without a shadow node.
    pub fn missing_from_shadow(&self) -> Vec<&ContentPath> {
        self.catalog_paths
            .difference(&self.shadowtree_paths)
            .collect()
    }

    /// Shadowed paths the catalog no longer lists.
    pub fn unknown_to_catalog(&self) -> Vec<&ContentPath> {
        self.shadowtree_paths
            .difference(&self.catalog_paths)
            .collect()
    }
}

/// Summary of a [`SecurityReindexer::sync`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Catalog entries processed.
    pub entries: usize,
    /// Shadow nodes created.
    pub nodes_created: usize,
}

fn catalog_entries(catalog: &dyn Catalog) -> Result<Vec<CatalogEntry>> {
    catalog
        .entries()
        .map_err(|e| SecIndexError::Catalog(format!("{:#}", e)))
}

impl SecurityReindexer {
    /// Populates the shadow tree from the catalog, reindexing every entry.
    ///
    /// Costs one permission fetch per entry; meant for initial setup or
    /// repair, not for routine use.
    pub fn sync(&self, catalog: &dyn Catalog) -> Result<SyncReport> {
        let mut entries = catalog_entries(catalog)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let mut tree = self.lock_tree()?;
        let before = tree.node_count();
        let mut processed = 0;
        for entry in &entries {
            if entry.path.is_root() {
                continue;
            }
            let id = tree.ensure_ancestry_to(&entry.path)?;
            let permissions = self.fetch(&entry.path)?;
            self.apply(&entry.path, &permissions)?;
            tree.update_security_info(
                id,
                &permissions,
                entry.block_inherit_roles,
                entry.path.clone(),
            )?;
            processed += 1;
        }

        let report = SyncReport {
            entries: processed,
            nodes_created: tree.node_count().saturating_sub(before),
        };
        info!(
            entries = report.entries,
            nodes_created = report.nodes_created,
            "synchronised shadow tree with catalog"
        );
        Ok(report)
    }

    /// Integrity snapshot of this reindexer's tree against `catalog`.
    pub fn integrity_info(&self, catalog: &dyn Catalog) -> Result<IntegrityInfo> {
        let tree = self
            .tree()
            .read()
            .map_err(|e| SecIndexError::Storage(e.to_string()))?;
        IntegrityInfo::collect(&tree, catalog)
    }
}
