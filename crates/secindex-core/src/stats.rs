//! Reindex outcomes and cumulative counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Work done by one propagation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Propagation {
    /// Distinct token groups in the working set.
    pub groups: usize,
    /// Permission authority calls, one per group.
    pub fetches: usize,
    /// Index updates, one per working-set member.
    pub index_updates: usize,
    /// Working-set size: the changed node plus its block-pruned descendants.
    pub visited: usize,
}

/// Result of a single `reindex` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReindexOutcome {
    /// The node is not indexable; nothing happened.
    Skipped,
    /// The node was reindexed and its token did not change.
    Unchanged,
    /// The token changed and descendants were reindexed.
    Propagated(Propagation),
}

impl ReindexOutcome {
    /// Permission authority calls made.
    pub fn fetches(&self) -> usize {
        match self {
            ReindexOutcome::Skipped => 0,
            ReindexOutcome::Unchanged => 1,
            ReindexOutcome::Propagated(p) => p.fetches,
        }
    }

    /// Index updates pushed.
    pub fn index_updates(&self) -> usize {
        match self {
            ReindexOutcome::Skipped => 0,
            ReindexOutcome::Unchanged => 1,
            ReindexOutcome::Propagated(p) => p.index_updates,
        }
    }
}

/// Cumulative counters of a reindexer.
#[derive(Debug, Default)]
pub struct ReindexStats {
    calls: AtomicU64,
    skipped: AtomicU64,
    short_circuits: AtomicU64,
    propagations: AtomicU64,
    fetches: AtomicU64,
    index_updates: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`ReindexStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReindexStatsSnapshot {
    /// `reindex` calls.
    pub calls: u64,
    /// Calls skipped as not indexable.
    pub skipped: u64,
    /// Calls that stopped at an unchanged token.
    pub short_circuits: u64,
    /// Calls that propagated to descendants.
    pub propagations: u64,
    /// Permission authority calls.
    pub fetches: u64,
    /// Index updates.
    pub index_updates: u64,
    /// Calls that returned an error.
    pub failures: u64,
}

impl ReindexStats {
    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, outcome: &ReindexOutcome) {
        let counter = match outcome {
            ReindexOutcome::Skipped => &self.skipped,
            ReindexOutcome::Unchanged => &self.short_circuits,
            ReindexOutcome::Propagated(_) => &self.propagations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_update(&self) {
        self.index_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> ReindexStatsSnapshot {
        ReindexStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            short_circuits: self.short_circuits.load(Ordering::Relaxed),
            propagations: self.propagations.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            index_updates: self.index_updates.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
