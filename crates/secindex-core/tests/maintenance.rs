//! Integration tests for content lifecycle hooks, catalog sync, integrity
//! checks and tree persistence.

mod common;

use common::Fixture;
use secindex_core::{
    ContentRef, InMemorySite, MemoryKvStore, RecordingIndex, ReindexOutcome, SecIndexError,
    SecurityIndexConfig, SecurityReindexer, ShadowTreeRegistry,
};
use std::sync::Arc;

#[test]
fn test_added_content_is_shadowed_without_indexing() {
    let f = Fixture::new();
    let content = f.site.add("/a/b").unwrap();
    f.reindexer.on_content_added(&content).unwrap();

    assert!(f.token("/a/b").is_some());
    assert!(f.token("/a").is_none());
    assert_eq!(f.index.updates(), 0);
    assert_eq!(f.site.fetches(), 1);
}

#[test]
fn test_adding_root_is_rejected() {
    let f = Fixture::new();
    let root = ContentRef::new(secindex_core::ContentPath::root());
    assert!(matches!(
        f.reindexer.on_content_added(&root),
        Err(SecIndexError::RootImmutable(_))
    ));
}

#[test]
fn test_removal_drops_only_the_removed_subtree() {
    let f = Fixture::new();
    f.populate(&["/a", "/a/b", "/a/b/c", "/a/d"]);

    assert_eq!(f.reindexer.on_content_removed("/a/b").unwrap(), 2);
    {
        let tree = f.reindexer.tree().read().unwrap();
        assert!(matches!(
            tree.traverse("/a/b"),
            Err(SecIndexError::PathNotFound(_))
        ));
        assert!(tree.traverse("/a/d").is_ok());
        let a = tree.traverse("/a").unwrap();
        assert_eq!(tree.node(a).unwrap().child_count(), 1);
    }
    assert_eq!(f.reindexer.on_content_removed("/a/b").unwrap(), 0);
}

#[test]
fn test_move_then_reindex_at_new_location() {
    let f = Fixture::new();
    f.populate(&["/a", "/a/b", "/a/b/c", "/z"]);
    f.site.grant("/z", "Editor").unwrap();
    f.reindex("/z");

    f.site.relocate("/a/b", "/z/b").unwrap();
    f.reindexer.on_content_moved("/a/b", "/z/b").unwrap();
    {
        let tree = f.reindexer.tree().read().unwrap();
        let c = tree.traverse("/z/b/c").unwrap();
        assert_eq!(tree.node(c).unwrap().physical_path().unwrap().to_string(), "/z/b/c");
        assert!(tree.traverse("/a/b").is_err());
    }

    f.reset_counters();
    assert!(matches!(f.reindex("/z/b"), ReindexOutcome::Propagated(_)));
    assert_eq!(f.indexed("/z/b/c"), vec!["Editor".to_string()]);
}

#[test]
fn test_move_into_own_subtree_is_rejected() {
    let f = Fixture::new();
    f.populate(&["/a", "/a/b"]);
    assert!(matches!(
        f.reindexer.on_content_moved("/a", "/a/b/a"),
        Err(SecIndexError::InvalidMove { .. })
    ));
}

#[test]
fn test_sync_builds_integral_tree() {
    let f = Fixture::new();
    for path in ["/a", "/a/b", "/a/b/c", "/d"] {
        f.site.add(path).unwrap();
    }
    f.site.grant("/a", "Editor").unwrap();
    f.site.set_block("/d", true).unwrap();

    let before = f.reindexer.integrity_info(f.site.as_ref()).unwrap();
    assert!(!before.is_integral());
    assert_eq!(before.missing_from_shadow().len(), 4);

    let report = f.reindexer.sync(f.site.as_ref()).unwrap();
    assert_eq!(report.entries, 4);
    assert_eq!(report.nodes_created, 4);
    assert_eq!(f.site.fetches(), 4);
    assert_eq!(f.indexed("/a/b/c"), vec!["Editor".to_string()]);

    let after = f.reindexer.integrity_info(f.site.as_ref()).unwrap();
    assert!(after.is_integral());
    assert_eq!(after.n_shadowed(), 4);

    f.reset_counters();
    assert_eq!(f.reindex("/a"), ReindexOutcome::Unchanged);
}

#[test]
fn test_integrity_detects_stale_shadow_nodes() {
    let f = Fixture::new();
    f.populate(&["/a", "/b"]);
    f.site.remove("/b").unwrap();

    let info = f.reindexer.integrity_info(f.site.as_ref()).unwrap();
    assert_eq!(info.unknown_to_catalog().len(), 1);
    assert_eq!(info.unknown_to_catalog()[0].to_string(), "/b");

    f.reindexer.on_content_removed("/b").unwrap();
    assert!(f.reindexer.integrity_info(f.site.as_ref()).unwrap().is_integral());
}

#[test]
fn test_registry_persists_tree_across_evictions() {
    let kv = Arc::new(MemoryKvStore::new());
    let registry = ShadowTreeRegistry::new(kv.clone());
    let site = Arc::new(InMemorySite::new());
    let index = Arc::new(RecordingIndex::new());
    let config = SecurityIndexConfig::default();

    let reindexer =
        SecurityReindexer::from_registry(&registry, site.clone(), index.clone(), config.clone())
            .unwrap();
    let content = site.add("/a").unwrap();
    reindexer.on_content_added(&content).unwrap();
    registry.flush(&config.namespace).unwrap();
    registry.evict(&config.namespace);

    let reopened = ShadowTreeRegistry::new(kv);
    let reindexer =
        SecurityReindexer::from_registry(&reopened, site.clone(), index, config.clone()).unwrap();
    assert_eq!(reindexer.reindex(&content).unwrap(), ReindexOutcome::Unchanged);
    assert_eq!(reopened.namespaces().unwrap(), vec![config.namespace.clone()]);

    reopened.delete(&config.namespace).unwrap();
    assert!(reopened.namespaces().unwrap().is_empty());
}

#[test]
fn test_namespaces_are_isolated() {
    let registry = ShadowTreeRegistry::new(Arc::new(MemoryKvStore::new()));
    let one = registry.root("one").unwrap();
    let two = registry.root("two").unwrap();
    one.write().unwrap().ensure_ancestry_to("/a").unwrap();

    assert_eq!(one.read().unwrap().node_count(), 2);
    assert_eq!(two.read().unwrap().node_count(), 1);
    assert!(Arc::ptr_eq(&one, &registry.root("one").unwrap()));
}

#[test]
fn test_invalid_config_is_rejected_by_registry_constructor() {
    let registry = ShadowTreeRegistry::new(Arc::new(MemoryKvStore::new()));
    let config = SecurityIndexConfig {
        index_ids: Vec::new(),
        ..SecurityIndexConfig::default()
    };
    let result = SecurityReindexer::from_registry(
        &registry,
        Arc::new(InMemorySite::new()),
        Arc::new(RecordingIndex::new()),
        config,
    );
    assert!(matches!(result, Err(SecIndexError::Config(_))));
}
