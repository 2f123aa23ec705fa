//! Shared fixtures for secindex integration tests.

#![allow(dead_code)]

use secindex_core::{
    InMemorySite, MemoryKvStore, RecordingIndex, SecurityIndexConfig, SecurityReindexer,
    ShadowTreeRegistry,
};
use std::sync::Arc;

/// Routes tracing output to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A site, a recording index and a reindexer wired together over a fresh
/// in-memory registry.
pub struct Fixture {
    pub site: Arc<InMemorySite>,
    pub index: Arc<RecordingIndex>,
    pub registry: ShadowTreeRegistry,
    pub reindexer: SecurityReindexer,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(SecurityIndexConfig::default())
    }

    pub fn with_config(config: SecurityIndexConfig) -> Self {
        init_tracing();
        let site = Arc::new(InMemorySite::new());
        let index = Arc::new(RecordingIndex::new());
        let registry = ShadowTreeRegistry::new(Arc::new(MemoryKvStore::new()));
        let reindexer =
            SecurityReindexer::from_registry(&registry, site.clone(), index.clone(), config)
                .expect("reindexer");
        Self {
            site,
            index,
            registry,
            reindexer,
        }
    }

    /// Adds every path to the site and shadows it, without touching the index.
    pub fn populate(&self, paths: &[&str]) {
        for path in paths {
            let content = self.site.add(*path).expect("add content");
            self.reindexer
                .on_content_added(&content)
                .expect("shadow content");
        }
        self.reset_counters();
    }

    /// Reindexes the current state of `path`.
    pub fn reindex(&self, path: &str) -> secindex_core::ReindexOutcome {
        let content = self.site.content(path).expect("content");
        self.reindexer.reindex(&content).expect("reindex")
    }

    pub fn reset_counters(&self) {
        self.site.reset_fetches();
        self.index.reset();
    }

    pub fn indexed(&self, path: &str) -> Vec<String> {
        self.index
            .indexed(path)
            .map(|set| set.iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn token(&self, path: &str) -> Option<secindex_core::SecurityToken> {
        let tree = self.reindexer.tree().read().expect("tree lock");
        let id = tree.traverse(path).ok()?;
        tree.node(id).and_then(|n| n.token())
    }
}
