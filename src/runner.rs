// src/runner.rs

use anyhow::{Context, Result};
use std::path::Path;
use tokio::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::enrich::{EnrichSummary, Enricher};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::table;

/// Enrich the CSV at `path` in place, fetching over HTTP as configured.
pub async fn run(path: &Path, config: &Config) -> Result<EnrichSummary> {
    config.validate()?;
    let fetcher = HttpFetcher::from_config(config)?;
    run_with(path, &Enricher::from_config(fetcher, config)).await
}

/// Load → enrich → persist with any fetcher. Nothing is written unless the
/// enrichment succeeds.
pub async fn run_with<F: Fetcher>(path: &Path, enricher: &Enricher<F>) -> Result<EnrichSummary> {
    let start = Instant::now();

    let table = table::load(path)?;
    info!(path = %path.display(), rows = table.len(), "loaded table");

    let (table, summary) = enricher
        .enrich_with_summary(table)
        .await
        .with_context(|| format!("enriching {}", path.display()))?;

    table::persist(path, &table)?;
    info!(
        path = %path.display(),
        merged = summary.merged,
        failed = summary.failed,
        elapsed = ?start.elapsed(),
        "table updated"
    );
    Ok(summary)
}
