//! The shadow tree.
//!
//! Mirrors the topology of the content tree and caches, per node, the
//! security token last computed for the corresponding content item. Nodes
//! live in a slab owned by [`ShadowTree`]; children are held by id in a
//! `BTreeMap` on their parent (so every traversal visits siblings in
//! ascending id order) and the parent link is a plain [`NodeId`] back
//! reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::iter;

use crate::error::{Result, SecIndexError};
use crate::path::{ContentPath, IntoContentPath};
use crate::token::{PermissionSet, SecurityToken};

/// Handle to a node in a [`ShadowTree`]. Handles of removed nodes are
/// recycled, so they must not be held across removals.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// The root node, present in every tree.
    pub const ROOT: NodeId = NodeId(0);

    /// Returns the raw slot number.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One node of the shadow tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowNode {
    id: String,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
    token: Option<SecurityToken>,
    block_inherit_roles: bool,
    physical_path: Option<ContentPath>,
}

impl ShadowNode {
    fn root() -> Self {
        Self::new(String::new(), None)
    }

    fn new(id: String, parent: Option<NodeId>) -> Self {
        Self {
            id,
            parent,
            children: BTreeMap::new(),
            token: None,
            block_inherit_roles: false,
            physical_path: None,
        }
    }

    /// Local id of the content item; empty for the root.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Containing node; `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Token recorded by the last security update, if any.
    pub fn token(&self) -> Option<SecurityToken> {
        self.token
    }

    /// Recorded local-role block flag.
    pub fn block_inherit_roles(&self) -> bool {
        self.block_inherit_roles
    }

    /// Path recorded by the last security update, if any.
    pub fn physical_path(&self) -> Option<&ContentPath> {
        self.physical_path.as_ref()
    }

    /// Child handles in ascending id order.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = (&str, NodeId)> {
        self.children.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Handle of the child with the given id.
    pub fn child(&self, id: &str) -> Option<NodeId> {
        self.children.get(id).copied()
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// True for the root node.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Slab-backed shadow tree with a permanent root at [`NodeId::ROOT`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShadowTree {
    slots: Vec<Option<ShadowNode>>,
    free: Vec<NodeId>,
    live: usize,
}

impl ShadowTree {
    /// Creates a tree holding only the root.
    pub fn new() -> Self {
        Self {
            slots: vec![Some(ShadowNode::root())],
            free: Vec::new(),
            live: 1,
        }
    }

    /// Handle of the root node.
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.live
    }

    /// Returns the node for a handle, or `None` if it was removed.
    pub fn node(&self, id: NodeId) -> Option<&ShadowNode> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    fn get(&self, id: NodeId) -> Result<&ShadowNode> {
        self.node(id).ok_or(SecIndexError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut ShadowNode> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(SecIndexError::UnknownNode(id))
    }

    fn alloc(&mut self, node: ShadowNode) -> NodeId {
        self.live += 1;
        match self.free.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                NodeId((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Returns the node at `path`, creating every missing node on the way.
    ///
    /// Existing nodes are passed through untouched, so calling this twice with
    /// the same path yields the same handle and creates nothing the second time.
    pub fn ensure_ancestry_to(&mut self, path: impl IntoContentPath) -> Result<NodeId> {
        let path = path.into_content_path()?;
        self.ensure_path(&path)
    }

    fn ensure_path(&mut self, path: &ContentPath) -> Result<NodeId> {
        let mut current = NodeId::ROOT;
        for segment in path.segments() {
            let existing = self.get(current)?.child(segment);
            current = match existing {
                Some(child) => child,
                None => {
                    let child = self.alloc(ShadowNode::new(segment.clone(), Some(current)));
                    self.get_mut(current)?
                        .children
                        .insert(segment.clone(), child);
                    child
                }
            };
        }
        Ok(current)
    }

    /// Looks up the node at `path` without creating anything.
    pub fn traverse(&self, path: impl IntoContentPath) -> Result<NodeId> {
        self.traverse_from(NodeId::ROOT, path)
    }

    /// Looks up a node relative to `start`.
    pub fn traverse_from(&self, start: NodeId, path: impl IntoContentPath) -> Result<NodeId> {
        let path = path.into_content_path()?;
        let mut current = start;
        for segment in path.segments() {
            current = self
                .get(current)?
                .child(segment)
                .ok_or_else(|| SecIndexError::PathNotFound(path.clone()))?;
        }
        Ok(current)
    }

    /// Root-relative path of a node, derived from its ancestry.
    pub fn path_of(&self, id: NodeId) -> Result<ContentPath> {
        let mut segments = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            segments.push(current.id.as_str());
            current = self.get(parent)?;
        }
        segments.reverse();
        ContentPath::from_segments(segments)
    }

    /// Records the security state of a content item on its node and returns
    /// the new token.
    pub fn update_security_info(
        &mut self,
        id: NodeId,
        permissions: &PermissionSet,
        block_inherit_roles: bool,
        physical_path: ContentPath,
    ) -> Result<SecurityToken> {
        if id == NodeId::ROOT {
            return Err(SecIndexError::RootImmutable("update_security_info"));
        }
        let node = self.get_mut(id)?;
        let token = SecurityToken::compute(permissions, block_inherit_roles);
        node.token = Some(token);
        node.block_inherit_roles = block_inherit_roles;
        node.physical_path = Some(physical_path);
        Ok(token)
    }

    pub(crate) fn restore_token(&mut self, id: NodeId, token: Option<SecurityToken>) -> Result<()> {
        self.get_mut(id)?.token = token;
        Ok(())
    }

    /// Lazy depth-first, pre-order walk over the descendants of `id`.
    ///
    /// Unless `ignore_block` is set, a node with `block_inherit_roles` is
    /// yielded but its own children are skipped. The flag of `id` itself
    /// never prunes the walk.
    pub fn descendants(&self, id: NodeId, ignore_block: bool) -> Descendants<'_> {
        let stack = match self.node(id) {
            Some(node) => node.children.values().rev().copied().collect(),
            None => Vec::new(),
        };
        Descendants {
            tree: self,
            stack,
            ignore_block,
        }
    }

    /// Removes the node at `path` together with its subtree and returns the
    /// number of nodes dropped. An absent path removes nothing.
    pub fn remove(&mut self, path: impl IntoContentPath) -> Result<usize> {
        let path = path.into_content_path()?;
        if path.is_root() {
            return Err(SecIndexError::RootImmutable("remove"));
        }
        match self.traverse(&path) {
            Ok(id) => {
                self.detach(id)?;
                Ok(self.free_subtree(id))
            }
            Err(SecIndexError::PathNotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Moves the subtree at `from` so that it lives at `to`.
    ///
    /// Missing ancestors of `to` are created and a node already at `to` is
    /// replaced. Recorded physical paths inside the moved subtree are
    /// rewritten; tokens are kept as they are.
    pub fn relocate(
        &mut self,
        from: impl IntoContentPath,
        to: impl IntoContentPath,
    ) -> Result<NodeId> {
        let from = from.into_content_path()?;
        let to = to.into_content_path()?;
        if from.is_root() || to.is_root() {
            return Err(SecIndexError::RootImmutable("relocate"));
        }
        if from == to {
            return self.traverse(&from);
        }
        if to.starts_with(&from) || from.starts_with(&to) {
            return Err(SecIndexError::InvalidMove { from, to });
        }

        let id = self.traverse(&from)?;
        let (parent_path, name) = match (to.parent(), to.name()) {
            (Some(parent), Some(name)) => (parent, name.to_string()),
            _ => return Err(SecIndexError::RootImmutable("relocate")),
        };
        let new_parent = self.ensure_path(&parent_path)?;
        let displaced = self.get(new_parent)?.child(&name);
        if let Some(existing) = displaced {
            self.detach(existing)?;
            self.free_subtree(existing);
        }

        self.detach(id)?;
        let node = self.get_mut(id)?;
        node.id = name.clone();
        node.parent = Some(new_parent);
        self.get_mut(new_parent)?.children.insert(name, id);

        let moved: Vec<NodeId> = iter::once(id).chain(self.descendants(id, true)).collect();
        for member in moved {
            let node = self.get_mut(member)?;
            let rebased = node
                .physical_path
                .as_ref()
                .and_then(|p| p.rebase(&from, &to));
            if rebased.is_some() {
                node.physical_path = rebased;
            }
        }
        Ok(id)
    }

    fn detach(&mut self, id: NodeId) -> Result<()> {
        let node = self.get(id)?;
        let name = node.id.clone();
        if let Some(parent) = node.parent {
            self.get_mut(parent)?.children.remove(&name);
        }
        Ok(())
    }

    fn free_subtree(&mut self, id: NodeId) -> usize {
        let doomed: Vec<NodeId> = iter::once(id).chain(self.descendants(id, true)).collect();
        for member in &doomed {
            self.slots[member.index()] = None;
            self.free.push(*member);
        }
        self.live -= doomed.len();
        doomed.len()
    }
}

impl Default for ShadowTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`ShadowTree::descendants`].
pub struct Descendants<'a> {
    tree: &'a ShadowTree,
    stack: Vec<NodeId>,
    ignore_block: bool,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            let id = self.stack.pop()?;
            let Some(node) = self.tree.node(id) else {
                continue;
            };
            if self.ignore_block || !node.block_inherit_roles {
                self.stack.extend(node.children.values().rev().copied());
            }
            return Some(id);
        }
    }
}
