//! Content lifecycle hooks that keep the shadow tree in step with the
//! content tree.

use tracing::debug;

use crate::error::{Result, SecIndexError};
use crate::host::ContentNode;
use crate::path::IntoContentPath;
use crate::reindex::SecurityReindexer;
use crate::tree::NodeId;

impl SecurityReindexer {
    /// Records a newly added item: its ancestry is materialized and its
    /// security state stored. The index is not touched.
    pub fn on_content_added(&self, node: &dyn ContentNode) -> Result<NodeId> {
        let path = node.path();
        if path.is_root() {
            return Err(SecIndexError::RootImmutable("on_content_added"));
        }
        let permissions = self.fetch(path)?;
        let mut tree = self.lock_tree()?;
        let id = tree.ensure_ancestry_to(path)?;
        let token = tree.update_security_info(
            id,
            &permissions,
            node.block_inherit_roles(),
            path.clone(),
        )?;
        debug!(%path, %token, "shadowed new content");
        Ok(id)
    }

    /// Drops the shadow node of a removed item and everything below it.
    /// Returns the number of nodes removed; unknown paths remove nothing.
    pub fn on_content_removed(&self, path: impl IntoContentPath) -> Result<usize> {
        let path = path.into_content_path()?;
        let removed = self.lock_tree()?.remove(&path)?;
        debug!(%path, removed, "unshadowed removed content");
        Ok(removed)
    }

    /// Moves the shadow subtree of a moved or renamed item. The host is
    /// expected to reindex the item at its new location afterwards.
    pub fn on_content_moved(
        &self,
        old_path: impl IntoContentPath,
        new_path: impl IntoContentPath,
    ) -> Result<NodeId> {
        let old_path = old_path.into_content_path()?;
        let new_path = new_path.into_content_path()?;
        let id = self.lock_tree()?.relocate(&old_path, &new_path)?;
        debug!(from = %old_path, to = %new_path, "moved shadowed content");
        Ok(id)
    }
}
