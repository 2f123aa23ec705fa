//! Security tokens: BLAKE3 fingerprints of a node's effective permission set
//! and its local-role block flag.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Domain separation for token hashing.
const TOKEN_CONTEXT: &[u8] = b"secindex.security-token.v1";

/// The resolved set of role/principal grants for a content node.
///
/// Backed by an ordered set, so two sets built from the same grants in any
/// order, with or without duplicates, compare and hash identically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Adds a grant. Returns false if it was already present.
    pub fn insert(&mut self, grant: impl Into<String>) -> bool {
        self.0.insert(grant.into())
    }

    /// Removes a grant. Returns false if it was absent.
    pub fn remove(&mut self, grant: &str) -> bool {
        self.0.remove(grant)
    }

    /// True if the grant is present.
    pub fn contains(&self, grant: &str) -> bool {
        self.0.contains(grant)
    }

    /// Number of distinct grants.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no grants.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Grants in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Adds every grant of `other`.
    pub fn union_with(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().cloned());
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for PermissionSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

/// A 32-byte fingerprint of (permission set, block flag).
///
/// Tokens are compared for equality only. Distinct inputs colliding is
/// possible in principle; with a 256-bit digest it is accepted as negligible
/// and no secondary comparison is made.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityToken([u8; 32]);

impl SecurityToken {
    /// Fingerprints a permission set together with the block flag.
    pub fn compute(permissions: &PermissionSet, block_inherit_roles: bool) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(TOKEN_CONTEXT);
        hasher.update(&(permissions.len() as u64).to_le_bytes());
        for grant in permissions.iter() {
            hasher.update(&(grant.len() as u64).to_le_bytes());
            hasher.update(grant.as_bytes());
        }
        hasher.update(&[block_inherit_roles as u8]);
        SecurityToken(*hasher.finalize().as_bytes())
    }

    /// Returns the raw digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form of the digest.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for SecurityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell tokens apart in logs.
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(grants: &[&str]) -> PermissionSet {
        grants.iter().copied().collect()
    }

    #[test]
    fn test_token_ignores_order_and_duplicates() {
        let a = SecurityToken::compute(&set(&["Reader", "Editor"]), false);
        let b = SecurityToken::compute(&set(&["Editor", "Reader", "Editor"]), false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_token_sensitive_to_block_flag() {
        let roles = set(&["Reader", "Editor"]);
        assert_ne!(
            SecurityToken::compute(&roles, true),
            SecurityToken::compute(&roles, false)
        );
    }

    #[test]
    fn test_token_sensitive_to_grants() {
        let a = SecurityToken::compute(&set(&["Role1", "Role2"]), true);
        let b = SecurityToken::compute(&set(&["Role1"]), true);
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_length_prefix_separates_grants() {
        let a = SecurityToken::compute(&set(&["ab", "c"]), false);
        let b = SecurityToken::compute(&set(&["a", "bc"]), false);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_set_is_tokenizable() {
        let empty = PermissionSet::new();
        assert_eq!(
            SecurityToken::compute(&empty, false),
            SecurityToken::compute(&empty, false)
        );
        assert_eq!(SecurityToken::compute(&empty, false).to_hex().len(), 64);
    }

    #[test]
    fn test_permission_set_ops() {
        let mut s = PermissionSet::new();
        assert!(s.insert("Reader"));
        assert!(!s.insert("Reader"));
        s.union_with(&set(&["Editor"]));
        assert_eq!(s.iter().collect::<Vec<_>>(), vec!["Editor", "Reader"]);
        assert!(s.remove("Editor"));
        assert!(!s.contains("Editor"));
        assert_eq!(s.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_token_permutation_invariant(
            mut grants in prop::collection::vec("[A-Za-z:]{1,12}", 0..16),
            block in any::<bool>(),
        ) {
            let forward: PermissionSet = grants.iter().cloned().collect();
            grants.reverse();
            let backward: PermissionSet = grants.into_iter().collect();
            prop_assert_eq!(
                SecurityToken::compute(&forward, block),
                SecurityToken::compute(&backward, block)
            );
        }
    }
}
