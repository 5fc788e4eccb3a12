//! Batch ingestion: tabular crawl-export records into dynamically schemed
//! result tables.
//!
//! The pipeline normalizes field names, infers column types, reconciles the
//! destination table through the schema registry, and appends the rows
//! tagged with crawl identity and provenance. The insert path only ever
//! writes columns confirmed present after reconciliation — a skipped column
//! never produces a failing INSERT.
//!
//! Semantics are at-least-once: a crash mid-batch leaves at most one
//! partially-applied append, recoverable by re-running ingestion for that
//! batch.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use spiderbase_shared::{
    ColumnDescriptor, CrawlId, FieldValue, Result, SpiderbaseError, TabularBatch,
};
use spiderbase_storage::{SchemaRegistry, Storage};

use crate::infer;
use crate::naming;
use crate::reader;

/// Names owned by the generated key and provenance columns; source fields
/// normalizing onto them are dropped rather than silently overwriting
/// crawl identity.
const RESERVED_FIELDS: [&str; 4] = ["id", "crawl_id", "processed_at", "source_file"];

/// Consumes batches of tabular records and writes them through the schema
/// registry into the store.
pub struct IngestionPipeline<'a> {
    storage: &'a Storage,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Ingest one batch from `source` on behalf of `crawl_id`. Returns the
    /// number of rows stored.
    ///
    /// Empty batches are a no-op: zero rows stored, no schema mutation.
    /// Append order within the batch is preserved, so row identifiers are
    /// deterministic per batch.
    #[instrument(skip_all, fields(source, crawl_id = %crawl_id))]
    pub async fn ingest(
        &self,
        source: &str,
        crawl_id: &CrawlId,
        batch: &TabularBatch,
    ) -> Result<usize> {
        if batch.is_empty() {
            debug!(source, "empty batch, nothing to ingest");
            return Ok(0);
        }

        let table = naming::derive_table_name(source)
            .map_err(|e| SpiderbaseError::ingestion(e.to_string()))?;

        // Normalize and dedupe field names, keeping the first occurrence and
        // its source position.
        let mut seen: HashSet<String> = HashSet::new();
        let mut fields: Vec<(String, usize)> = Vec::with_capacity(batch.columns.len());
        for (idx, raw) in batch.columns.iter().enumerate() {
            let Some(name) = naming::normalize_field_name(raw) else {
                warn!(source, field = %raw, "dropping field with unusable name");
                continue;
            };
            if RESERVED_FIELDS.contains(&name.as_str()) {
                warn!(source, field = %raw, "dropping field shadowing a provenance column");
                continue;
            }
            if !seen.insert(name.clone()) {
                warn!(source, field = %raw, %name, "dropping duplicate field");
                continue;
            }
            fields.push((name, idx));
        }

        if fields.is_empty() {
            return Err(SpiderbaseError::ingestion(format!(
                "source '{source}' has no usable columns"
            )));
        }

        let requested: Vec<ColumnDescriptor> = fields
            .iter()
            .map(|(name, idx)| ColumnDescriptor::new(name.clone(), infer::infer(name, batch.sample(*idx))))
            .collect();

        let registry = SchemaRegistry::new(self.storage);
        let outcome = registry.ensure_table(&table, &requested).await?;
        debug!(%table, ?outcome, "schema reconciled");

        // Write only columns confirmed present post-reconciliation.
        let live: HashSet<String> = registry.live_columns(&table).await?.into_iter().collect();
        let confirmed: Vec<(String, usize)> = fields
            .into_iter()
            .filter(|(name, _)| {
                if live.contains(name) {
                    true
                } else {
                    warn!(%table, column = %name, "column not live after reconciliation, omitting");
                    false
                }
            })
            .collect();

        let names: Vec<String> = confirmed.iter().map(|(name, _)| name.clone()).collect();
        let rows: Vec<Vec<FieldValue>> = batch
            .rows
            .iter()
            .map(|row| {
                confirmed
                    .iter()
                    .map(|(_, idx)| row.get(*idx).cloned().unwrap_or(FieldValue::Null))
                    .collect()
            })
            .collect();

        let stored = registry
            .append_rows(&table, &names, &rows, crawl_id, source, Utc::now())
            .await?;

        info!(source, %table, stored, "batch ingested");
        Ok(stored)
    }

    /// Read a delimited export file and ingest it. The file's path is kept
    /// as the source identifier for provenance.
    pub async fn ingest_file(
        &self,
        path: &Path,
        crawl_id: &CrawlId,
        delimiter: char,
    ) -> Result<usize> {
        let batch = reader::read_delimited_file(path, delimiter)?;
        self.ingest(&path.to_string_lossy(), crawl_id, &batch).await
    }
}
