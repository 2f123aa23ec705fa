//! Compares naive and shadow-tree security reindexing on a synthetic tree.
//!
//! The naive strategy fetches and indexes every node below a changed item.
//! The shadow-tree strategy fetches once per token group. Both run against
//! the same in-memory site so that counts are directly comparable.

use anyhow::Result;
use clap::Parser;
use secindex_core::{
    ContentPath, IndexableEntry, InMemorySite, MemoryKvStore, PermissionAuthority,
    RecordingIndex, SearchIndex, SecurityIndexConfig, SecurityReindexer, ShadowTreeRegistry,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const BENCH_ROOT: &str = "/bench";

#[derive(Parser)]
#[command(name = "secindex-bench")]
#[command(about = "Naive versus shadow-tree security reindexing", long_about = None)]
struct Cli {
    /// Depth of the synthetic tree below the benchmark root.
    #[arg(short, long, default_value = "2", env = "BENCHMARK_N_LEVELS")]
    levels: u32,

    /// Children per folder.
    #[arg(short, long, default_value = "2", env = "BENCHMARK_N_SIBLINGS")]
    siblings: u32,

    /// Role granted on the benchmark root.
    #[arg(short, long, default_value = "Editor")]
    role: String,

    /// Reindexer settings (.toml or .json).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write the report to this file.
    #[arg(long, env = "BENCHMARK_RESULTS_FILE")]
    results_file: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct StrategyResult {
    fetches: u64,
    index_updates: u64,
    elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
struct BenchReport {
    levels: u32,
    siblings: u32,
    n_objects: usize,
    naive: StrategyResult,
    shadow_tree: StrategyResult,
    unchanged_reindex: StrategyResult,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SecurityIndexConfig::from_file(path)?,
        None => SecurityIndexConfig::default(),
    };

    let site = Arc::new(InMemorySite::new());
    let paths = build_site(&site, cli.levels, cli.siblings)?;
    tracing::info!(
        levels = cli.levels,
        siblings = cli.siblings,
        n_objects = paths.len(),
        "built synthetic site"
    );

    let registry = ShadowTreeRegistry::new(Arc::new(MemoryKvStore::new()));
    let index = Arc::new(RecordingIndex::new());
    let reindexer = SecurityReindexer::from_registry(
        &registry,
        site.clone(),
        index.clone(),
        config.clone(),
    )?;
    reindexer.sync(site.as_ref())?;

    site.grant(BENCH_ROOT, &cli.role)?;

    site.reset_fetches();
    index.reset();
    let naive = run_naive(&site, &index, &paths, &config.index_ids)?;

    site.reset_fetches();
    index.reset();
    let started = Instant::now();
    reindexer.reindex(&site.content(BENCH_ROOT)?)?;
    let shadow_tree = measure(&site, &index, started);

    site.reset_fetches();
    index.reset();
    let started = Instant::now();
    reindexer.reindex(&site.content(BENCH_ROOT)?)?;
    let unchanged_reindex = measure(&site, &index, started);

    let report = BenchReport {
        levels: cli.levels,
        siblings: cli.siblings,
        n_objects: paths.len(),
        naive,
        shadow_tree,
        unchanged_reindex,
    };
    let json = serde_json::to_string_pretty(&report)?;
    if let Some(path) = &cli.results_file {
        std::fs::write(path, &json)?;
        tracing::info!(path = %path.display(), "wrote benchmark results");
    }
    println!("{}", json);
    Ok(())
}

/// Creates the benchmark root and a full tree of `siblings` children per
/// folder, `levels` deep. Returns every created path, parents first.
fn build_site(site: &InMemorySite, levels: u32, siblings: u32) -> Result<Vec<ContentPath>> {
    let root = site.add(BENCH_ROOT)?.path;
    let mut paths = vec![root.clone()];
    let mut frontier = vec![root];
    for level in 0..levels {
        let mut next = Vec::with_capacity(frontier.len() * siblings as usize);
        for parent in &frontier {
            for n in 0..siblings {
                let child = parent.join(&format!("item-{}-{}", level, n))?;
                site.add(&child)?;
                next.push(child);
            }
        }
        paths.extend(next.iter().cloned());
        frontier = next;
    }
    Ok(paths)
}

/// Fetches and indexes every node, the way a reindex without a shadow tree
/// has to.
fn run_naive(
    site: &InMemorySite,
    index: &RecordingIndex,
    paths: &[ContentPath],
    index_ids: &[String],
) -> Result<StrategyResult> {
    let started = Instant::now();
    for path in paths {
        let permissions = site.effective_permission_set(path)?;
        index.apply_update(&IndexableEntry::new(path.clone(), permissions), index_ids)?;
    }
    Ok(measure(site, index, started))
}

fn measure(site: &InMemorySite, index: &RecordingIndex, started: Instant) -> StrategyResult {
    StrategyResult {
        fetches: site.fetches(),
        index_updates: index.updates(),
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    }
}
