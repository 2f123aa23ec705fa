//! Diff-and-batch security reindexing.
//!
//! A naive security reindex refreshes a node and every node below it, each
//! one costing a permission lookup. [`SecurityReindexer::reindex`] instead:
//!
//!  1. materializes the shadow node of the changed item and remembers its
//!     token,
//!  2. fetches the item's effective permission set, writes it to the index
//!     (always: a workflow change can alter what is indexed without altering
//!     local roles) and stores the new token,
//!  3. stops if the token is unchanged, since nothing below can have
//!     inherited anything new,
//!  4. otherwise walks the block-pruned descendants, groups the working set
//!     by token and fetches one permission set per group, writing it to the
//!     index for every member of the group.
//!
//! The changed node is keyed by its fresh token, descendants by the token
//! they carried before the pass. Descendants without a token have never been
//! fingerprinted and each form a group of their own. Groups and members are
//! processed in traversal order; the changed node's group reuses the fetch
//! from step 2.
//!
//! Failures are not rolled back: index updates already pushed stand. The
//! changed node's token is reset to its previous value so that a redelivered
//! event propagates again instead of short-circuiting.

use std::collections::HashMap;
use std::sync::{Arc, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::config::SecurityIndexConfig;
use crate::error::{Result, SecIndexError};
use crate::host::{ContentNode, IndexableEntry, PermissionAuthority, SearchIndex};
use crate::path::ContentPath;
use crate::registry::{ShadowTreeRegistry, SharedTree};
use crate::stats::{Propagation, ReindexOutcome, ReindexStats, ReindexStatsSnapshot};
use crate::token::{PermissionSet, SecurityToken};
use crate::tree::{NodeId, ShadowNode, ShadowTree};

/// Reindexes access-control entries using a shadow tree of security tokens.
pub struct SecurityReindexer {
    tree: SharedTree,
    authority: Arc<dyn PermissionAuthority>,
    index: Arc<dyn SearchIndex>,
    config: SecurityIndexConfig,
    stats: ReindexStats,
}

impl SecurityReindexer {
    /// Creates a reindexer over an already opened tree.
    pub fn new(
        tree: SharedTree,
        authority: Arc<dyn PermissionAuthority>,
        index: Arc<dyn SearchIndex>,
        config: SecurityIndexConfig,
    ) -> Self {
        Self {
            tree,
            authority,
            index,
            config,
            stats: ReindexStats::default(),
        }
    }

    /// Creates a reindexer over the tree of `config.namespace`.
    pub fn from_registry(
        registry: &ShadowTreeRegistry,
        authority: Arc<dyn PermissionAuthority>,
        index: Arc<dyn SearchIndex>,
        config: SecurityIndexConfig,
    ) -> Result<Self> {
        config.validate()?;
        let tree = registry.root(&config.namespace)?;
        Ok(Self::new(tree, authority, index, config))
    }

    /// The shared tree this reindexer maintains.
    pub fn tree(&self) -> &SharedTree {
        &self.tree
    }

    /// Active configuration.
    pub fn config(&self) -> &SecurityIndexConfig {
        &self.config
    }

    /// Cumulative counters.
    pub fn stats(&self) -> ReindexStatsSnapshot {
        self.stats.snapshot()
    }

    /// Reindexes `node` and whichever descendants its change affects.
    pub fn reindex(&self, node: &dyn ContentNode) -> Result<ReindexOutcome> {
        self.stats.record_call();
        let result = self.reindex_node(node);
        match &result {
            Ok(outcome) => self.stats.record_outcome(outcome),
            Err(_) => self.stats.record_failure(),
        }
        result
    }

    fn reindex_node(&self, node: &dyn ContentNode) -> Result<ReindexOutcome> {
        let path = node.path();
        if !node.is_indexable() {
            debug!(%path, "content not indexable, skipping");
            return Ok(ReindexOutcome::Skipped);
        }
        if path.is_root() {
            return Err(SecIndexError::RootImmutable("reindex"));
        }

        let mut tree = self.lock_tree()?;
        let shadow = tree.ensure_ancestry_to(path)?;
        let token_before = tree.node(shadow).and_then(ShadowNode::token);

        let permissions = self.fetch(path)?;
        self.apply(path, &permissions)?;
        let token_after = tree.update_security_info(
            shadow,
            &permissions,
            node.block_inherit_roles(),
            path.clone(),
        )?;

        if token_before == Some(token_after) {
            debug!(%path, token = %token_after, "security token unchanged");
            return Ok(ReindexOutcome::Unchanged);
        }

        let groups = group_by_token(&tree, shadow, token_after);
        match self.propagate(&mut tree, shadow, &permissions, groups) {
            Ok(propagation) => {
                debug!(
                    %path,
                    groups = propagation.groups,
                    fetches = propagation.fetches,
                    index_updates = propagation.index_updates,
                    "propagated security change"
                );
                Ok(ReindexOutcome::Propagated(propagation))
            }
            Err(e) => {
                tree.restore_token(shadow, token_before)?;
                Err(e)
            }
        }
    }

    fn propagate(
        &self,
        tree: &mut ShadowTree,
        shadow: NodeId,
        shadow_permissions: &PermissionSet,
        groups: Vec<Vec<NodeId>>,
    ) -> Result<Propagation> {
        let mut summary = Propagation {
            groups: groups.len(),
            fetches: 1,
            index_updates: 1,
            visited: groups.iter().map(Vec::len).sum(),
        };

        for group in groups {
            let Some(&representative) = group.first() else {
                continue;
            };
            let fetched;
            let permissions = if representative == shadow {
                shadow_permissions
            } else {
                fetched = self.fetch(&tree.path_of(representative)?)?;
                summary.fetches += 1;
                &fetched
            };

            for &member in &group {
                if member == shadow {
                    continue;
                }
                let path = tree.path_of(member)?;
                self.apply(&path, permissions)?;
                summary.index_updates += 1;
                if self.config.refresh_descendant_tokens {
                    let block = tree
                        .node(member)
                        .map(ShadowNode::block_inherit_roles)
                        .ok_or(SecIndexError::UnknownNode(member))?;
                    tree.update_security_info(member, permissions, block, path)?;
                }
            }
        }
        Ok(summary)
    }

    pub(crate) fn lock_tree(&self) -> Result<RwLockWriteGuard<'_, ShadowTree>> {
        self.tree
            .write()
            .map_err(|e| SecIndexError::Storage(e.to_string()))
    }

    pub(crate) fn fetch(&self, path: &ContentPath) -> Result<PermissionSet> {
        self.stats.record_fetch();
        self.authority
            .effective_permission_set(path)
            .map_err(|e| {
                warn!(%path, error = %e, "permission fetch failed");
                SecIndexError::PermissionFetch {
                    path: path.clone(),
                    reason: format!("{:#}", e),
                }
            })
    }

    pub(crate) fn apply(&self, path: &ContentPath, permissions: &PermissionSet) -> Result<()> {
        let entry = IndexableEntry::new(path.clone(), permissions.clone());
        self.index
            .apply_update(&entry, &self.config.index_ids)
            .map_err(|e| {
                warn!(%path, error = %e, "index update failed");
                SecIndexError::IndexUpdate {
                    path: path.clone(),
                    reason: format!("{:#}", e),
                }
            })?;
        self.stats.record_index_update();
        Ok(())
    }
}

/// Partitions `shadow` and its block-pruned descendants by token, in order
/// of first appearance.
fn group_by_token(
    tree: &ShadowTree,
    shadow: NodeId,
    shadow_token: SecurityToken,
) -> Vec<Vec<NodeId>> {
    let mut groups = vec![vec![shadow]];
    let mut slots: HashMap<SecurityToken, usize> = HashMap::from([(shadow_token, 0)]);
    for id in tree.descendants(shadow, false) {
        match tree.node(id).and_then(ShadowNode::token) {
            Some(token) => {
                let slot = *slots.entry(token).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[slot].push(id);
            }
            None => groups.push(vec![id]),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(grants: &[&str]) -> PermissionSet {
        grants.iter().copied().collect()
    }

    fn tokenize(tree: &mut ShadowTree, path: &str, grants: &[&str], block: bool) -> NodeId {
        let id = tree.ensure_ancestry_to(path).unwrap();
        tree.update_security_info(
            id,
            &roles(grants),
            block,
            ContentPath::parse(path).unwrap(),
        )
        .unwrap();
        id
    }

    #[test]
    fn test_group_by_token_orders_by_first_appearance() {
        let mut tree = ShadowTree::new();
        let a = tokenize(&mut tree, "/a", &["R", "E"], false);
        let b = tokenize(&mut tree, "/a/b", &["R"], false);
        let c = tokenize(&mut tree, "/a/b/c", &["R", "X"], false);
        let d = tokenize(&mut tree, "/a/d", &["R"], false);
        let fresh = tree.node(a).unwrap().token().unwrap();

        let groups = group_by_token(&tree, a, fresh);
        assert_eq!(groups, vec![vec![a], vec![b, d], vec![c]]);
    }

    #[test]
    fn test_group_by_token_merges_descendant_matching_fresh_token() {
        let mut tree = ShadowTree::new();
        let a = tokenize(&mut tree, "/a", &["R", "E"], false);
        let b = tokenize(&mut tree, "/a/b", &["R", "E"], false);
        let fresh = tree.node(a).unwrap().token().unwrap();
        assert_eq!(group_by_token(&tree, a, fresh), vec![vec![a, b]]);
    }

    #[test]
    fn test_group_by_token_isolates_untokenized_nodes() {
        let mut tree = ShadowTree::new();
        let a = tokenize(&mut tree, "/a", &["R"], false);
        let x = tree.ensure_ancestry_to("/a/x").unwrap();
        let y = tree.ensure_ancestry_to("/a/y").unwrap();
        let fresh = tree.node(a).unwrap().token().unwrap();
        assert_eq!(group_by_token(&tree, a, fresh), vec![vec![a], vec![x], vec![y]]);
    }

    #[test]
    fn test_group_by_token_prunes_below_block() {
        let mut tree = ShadowTree::new();
        let a = tokenize(&mut tree, "/a", &["R"], false);
        let b = tokenize(&mut tree, "/a/b", &["R"], true);
        tokenize(&mut tree, "/a/b/c", &["R"], false);
        let fresh = tree.node(a).unwrap().token().unwrap();
        assert_eq!(group_by_token(&tree, a, fresh), vec![vec![a], vec![b]]);
    }
}
