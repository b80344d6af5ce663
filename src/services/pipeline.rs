//! Incremental indexing run: LOAD, DIFF, EMBED_AND_WRITE.
//!
//! The remote index is the only checkpoint. A rerun after a crash or an
//! interrupt picks up the ids that never made it into the namespace.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::error::{ConfigError, PipelineError};
use crate::models::{IndexEntry, MetadataRecord, RunReport, Stage};
use crate::services::differ::IndexDiffer;
use crate::services::document_builder::DocumentBuilder;
use crate::services::embedding::EmbeddingClient;
use crate::services::metadata_store::RecordSource;
use crate::services::vector_index::VectorIndex;
use crate::services::writer::IndexWriter;
use crate::utils::{RetryConfig, with_retry};

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Read at most this many rows from the metadata store.
    pub limit: Option<usize>,
    /// Stop after the diff and report what would be embedded.
    pub dry_run: bool,
    /// Draw a progress bar during EMBED_AND_WRITE.
    pub show_progress: bool,
}

pub struct Pipeline {
    source: Arc<dyn RecordSource>,
    builder: DocumentBuilder,
    embedder: EmbeddingClient,
    index: Arc<dyn VectorIndex>,
    namespace: String,
    retry: RetryConfig,
}

/// Records keyed by id, first-seen order, last occurrence wins.
struct Candidates {
    order: Vec<String>,
    records: HashMap<String, MetadataRecord>,
    skipped_without_id: u64,
}

impl Candidates {
    fn collect(records: Vec<MetadataRecord>) -> Self {
        let mut order = Vec::new();
        let mut by_id: HashMap<String, MetadataRecord> = HashMap::new();
        let mut skipped_without_id = 0;

        for mut record in records {
            record.trim_id();
            let id = record.id().to_string();
            if id.is_empty() {
                skipped_without_id += 1;
                continue;
            }
            if by_id.insert(id.clone(), record).is_none() {
                order.push(id);
            }
        }

        Self {
            order,
            records: by_id,
            skipped_without_id,
        }
    }
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn RecordSource>,
        builder: DocumentBuilder,
        embedder: EmbeddingClient,
        index: Arc<dyn VectorIndex>,
        namespace: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            source,
            builder,
            embedder,
            index,
            namespace: namespace.into(),
            retry,
        }
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let mut report = RunReport {
            dry_run: options.dry_run,
            started_at: Utc::now().to_rfc3339(),
            ..Default::default()
        };

        self.prepare_index().await?;

        info!(stage = %Stage::Load, limit = ?options.limit, "loading metadata records");
        let source = Arc::clone(&self.source);
        let limit = options.limit;
        let records = tokio::task::spawn_blocking(move || source.load(limit)).await??;
        report.total_records = records.len() as u64;

        let mut candidates = Candidates::collect(records);
        report.total_candidates = candidates.order.len() as u64;
        report.skipped_without_id = candidates.skipped_without_id;
        if candidates.skipped_without_id > 0 {
            warn!(
                skipped = candidates.skipped_without_id,
                "records without an identifier were skipped"
            );
        }

        info!(stage = %Stage::Diff, candidates = report.total_candidates, "checking remote index");
        let differ = IndexDiffer::new(
            Arc::clone(&self.index),
            self.namespace.clone(),
            self.retry.clone(),
        );
        let new_ids = differ.diff(&candidates.order).await?;
        report.to_process = new_ids.len() as u64;
        report.already_indexed = report.total_candidates - report.to_process;

        if options.dry_run {
            info!(
                to_process = report.to_process,
                already_indexed = report.already_indexed,
                "dry run, nothing embedded"
            );
            report.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        }

        info!(stage = %Stage::EmbedAndWrite, to_process = report.to_process, "embedding new records");
        let writer = IndexWriter::new(
            Arc::clone(&self.index),
            self.namespace.clone(),
            self.retry.clone(),
        );
        let progress = progress_bar(new_ids.len() as u64, options.show_progress);

        for id in &new_ids {
            progress.inc(1);
            let Some(record) = candidates.records.remove(id) else {
                continue;
            };

            let document = self.builder.build(&record);
            let text = document.embedding_text();

            let vector = match self.embedder.embed_passage(&text).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(id = %id, error = %e, "embedding failed, skipping record");
                    report.embedding_failures += 1;
                    continue;
                }
            };

            let entry = IndexEntry::new(id.clone(), vector, document);
            match writer.write(&entry).await {
                Ok(()) => report.indexed += 1,
                Err(e) => {
                    warn!(id = %id, error = %e, "upsert failed");
                    report.upsert_failures += 1;
                }
            }
        }
        progress.finish_and_clear();

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            stage = %Stage::Done,
            indexed = report.indexed,
            embedding_failures = report.embedding_failures,
            upsert_failures = report.upsert_failures,
            duration_ms = report.duration_ms,
            "run finished"
        );
        Ok(report)
    }

    /// Create the index when absent and check it matches the model's dimension.
    async fn prepare_index(&self) -> Result<(), PipelineError> {
        let dimension = self.embedder.dimension();
        let info = with_retry(&self.retry, || self.index.ensure_index(dimension))
            .await
            .into_result()?;

        if info.created {
            info!(index = %info.name, dimension, "created index");
        }

        if info.dimension != dimension {
            return Err(ConfigError::DimensionMismatch {
                index: info.name,
                model_dimension: dimension,
                index_dimension: info.dimension,
            }
            .into());
        }
        Ok(())
    }
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
