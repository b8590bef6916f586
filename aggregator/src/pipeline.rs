//! One aggregation run: fetch every configured source, normalize and
//! deduplicate the records, re-encode and chunk them, then persist the chunks
//! through the incremental writer.

use crate::chunker::{build_chunks, encode_lines};
use crate::fetcher::{FetchOutcome, SourceFetcher};
use crate::metrics_defs::{
    RECORDS_DUPLICATE, RECORDS_FAILED, RECORDS_PARSED, RECORDS_UNIQUE, RUN_DURATION, RUN_FAILED,
    SOURCES_FAILED, SOURCES_OK,
};
use crate::normalize::{Normalizer, ParseStats};
use crate::settings::{Settings, SettingsError};
use crate::stats::RunStats;
use crate::store::{KvStore, StoreError};
use crate::writer::write_chunks;
use serde::Serialize;
use shared::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("could not read settings: {0}")]
    Settings(#[from] SettingsError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    pub total: usize,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub ok: usize,
    pub fail: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedSource {
    pub source: String,
    pub status: u16,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// True iff any chunk was rewritten or the chunk count changed.
    pub updated: bool,
    pub records: usize,
    pub chunks: ChunkSummary,
    pub per_source: SourceSummary,
    pub failed_sources: Vec<FailedSource>,
    /// 1-based indices of the chunks rewritten by this run.
    pub changed: Vec<usize>,
    pub deleted: Vec<usize>,
    pub stats: RunStats,
}

#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn KvStore>,
    settings: Settings,
    fetcher: SourceFetcher,
}

impl Pipeline {
    pub fn new(store: Arc<dyn KvStore>, fetcher: SourceFetcher) -> Self {
        Pipeline {
            settings: Settings::new(store.clone()),
            store,
            fetcher,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Runs the aggregation once. Source and parse failures are reported in
    /// the result; only storage failures abort the run.
    pub async fn run(&self) -> Result<RunResult, RunError> {
        let started = Instant::now();
        let result = self.run_once().await;
        histogram!(RUN_DURATION).record(started.elapsed().as_secs_f64());

        match &result {
            Ok(run) => tracing::info!(
                updated = run.updated,
                records = run.records,
                chunks = run.chunks.total,
                sources_ok = run.per_source.ok,
                sources_failed = run.per_source.fail,
                changed = ?run.changed,
                "aggregation run finished"
            ),
            Err(e) => {
                counter!(RUN_FAILED).increment(1);
                tracing::error!(error = %e, "aggregation run failed");
            }
        }

        result
    }

    async fn run_once(&self) -> Result<RunResult, RunError> {
        let sources = self.settings.sources().await?;
        let chunk_size = self.settings.chunk_size().await?;
        let base64_output = self.settings.base64_encode().await?;

        let outcomes = self.fetcher.fetch_all(&sources).await;
        let per_source = summarize_sources(&outcomes);

        let mut normalizer = Normalizer::new();
        for body in outcomes.iter().filter(|o| o.ok).filter_map(|o| o.body.as_deref()) {
            normalizer.ingest(body);
        }
        let normalized = normalizer.finish();
        tracing::debug!(
            lines = normalized.stats.lines_total,
            parsed = normalized.stats.parsed(),
            failed = normalized.stats.failed(),
            duplicates = normalized.duplicates,
            "parsed fetched sources"
        );

        let lines = encode_lines(&normalized.unique);
        let chunks = build_chunks(&lines, chunk_size, base64_output);

        record_metrics(
            &per_source,
            &normalized.stats,
            normalized.unique.len(),
            normalized.duplicates,
        );

        let stats = RunStats::new(
            normalized.stats,
            normalized.duplicates,
            chunks.iter().map(|c| c.line_count).collect(),
        );
        let outcome = write_chunks(self.store.as_ref(), &chunks, base64_output, &stats).await?;

        Ok(RunResult {
            updated: outcome.updated(),
            records: normalized.unique.len(),
            chunks: ChunkSummary {
                total: outcome.total,
                size: chunk_size.get(),
            },
            failed_sources: outcomes
                .iter()
                .filter(|o| !o.ok)
                .map(|o| FailedSource {
                    source: o.source.clone(),
                    status: o.status,
                    error: o.error.clone().unwrap_or_default(),
                })
                .collect(),
            per_source,
            changed: outcome.changed,
            deleted: outcome.deleted,
            stats,
        })
    }
}

fn summarize_sources(outcomes: &[FetchOutcome]) -> SourceSummary {
    let ok = outcomes.iter().filter(|o| o.ok).count();
    SourceSummary {
        ok,
        fail: outcomes.len() - ok,
    }
}

fn record_metrics(
    per_source: &SourceSummary,
    parse: &ParseStats,
    unique: usize,
    duplicates: usize,
) {
    counter!(SOURCES_OK).increment(per_source.ok as u64);
    counter!(SOURCES_FAILED).increment(per_source.fail as u64);

    for (scheme, count) in &parse.parsed_by_scheme {
        counter!(RECORDS_PARSED, "scheme" => scheme.clone()).increment(*count as u64);
    }
    for (scheme, count) in &parse.failed_by_scheme {
        counter!(RECORDS_FAILED, "scheme" => scheme.clone()).increment(*count as u64);
    }

    gauge!(RECORDS_UNIQUE).set(unique as f64);
    histogram!(RECORDS_DUPLICATE).record(duplicates as f64);
}
