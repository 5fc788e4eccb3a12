//! Schema registry: dynamic result-table creation and column reconciliation.
//!
//! Result tables are defined by whatever columns the crawl exports carry.
//! Reconciliation compares the requested column set against the table's live
//! column set (re-queried from the store, never a cache) and applies only the
//! missing additions. Columns are only ever added — never removed or retyped.

use chrono::{DateTime, Utc};
use libsql::params;
use serde_json::json;
use spiderbase_shared::{
    ColumnDescriptor, CrawlId, FieldValue, Result, SpiderbaseError, is_valid_identifier,
};
use tracing::{debug, info, warn};

use crate::Storage;

/// Column names reserved for the generated key and provenance columns.
/// Requested columns colliding with these are dropped during reconciliation.
const RESERVED_COLUMNS: [&str; 4] = ["id", "crawl_id", "processed_at", "source_file"];

/// Outcome of a table reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The table did not exist and was created with the full column set.
    Created,
    /// The table existed; the named columns were added.
    ColumnsAdded(Vec<String>),
    /// The table already had every requested column. Zero ALTERs performed.
    AlreadySatisfied,
}

/// Owns the mapping from logical table name to its current column set.
pub struct SchemaRegistry<'a> {
    storage: &'a Storage,
}

impl<'a> SchemaRegistry<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Guarantee that `table` exists and has at least `columns`.
    ///
    /// Idempotent and safe to call repeatedly with growing column sets. A
    /// column that cannot be added (bad identifier, storage-layer collision)
    /// is logged and skipped; it does not abort the remaining columns. The
    /// whole reconciliation commits or is abandoned as one transaction.
    pub async fn ensure_table(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<ReconcileOutcome> {
        if !is_valid_identifier(table) {
            return Err(SpiderbaseError::schema(format!(
                "'{table}' is not a valid table identifier"
            )));
        }

        let requested = self.admissible_columns(columns);
        let exists = self.table_exists(table).await?;

        self.storage.begin().await?;
        let outcome = if exists {
            self.reconcile_existing(table, &requested).await
        } else {
            self.create_table(table, &requested).await
        };

        match outcome {
            Ok(outcome) => {
                self.storage.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                self.storage.rollback().await;
                Err(e)
            }
        }
    }

    /// The table's live column names, read straight from the store.
    pub async fn live_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .live_schema(table)
            .await?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// The table's live (column name, declared SQL type) pairs.
    pub async fn live_schema(&self, table: &str) -> Result<Vec<(String, String)>> {
        if !is_valid_identifier(table) {
            return Err(SpiderbaseError::schema(format!(
                "'{table}' is not a valid table identifier"
            )));
        }

        let mut rows = self
            .storage
            .conn
            .query(&format!("PRAGMA table_info({table})"), params![])
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        let mut columns = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let name: String = row
                .get(1)
                .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
            let ty: String = row
                .get(2)
                .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
            columns.push((name, ty));
        }
        Ok(columns)
    }

    /// Number of rows currently stored in `table`.
    pub async fn count_rows(&self, table: &str) -> Result<u64> {
        if !is_valid_identifier(table) {
            return Err(SpiderbaseError::schema(format!(
                "'{table}' is not a valid table identifier"
            )));
        }

        let mut rows = self
            .storage
            .conn
            .query(&format!("SELECT COUNT(*) FROM {table}"), params![])
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(SpiderbaseError::Storage(e.to_string())),
        }
    }

    /// Whether `table` exists in the store.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut rows = self
            .storage
            .conn
            .query(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
            )
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        Ok(rows
            .next()
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?
            .is_some())
    }

    /// Result tables known to the schema catalog, in name order.
    pub async fn list_result_tables(&self) -> Result<Vec<String>> {
        let mut rows = self
            .storage
            .conn
            .query(
                "SELECT table_name FROM table_schemas ORDER BY table_name",
                params![],
            )
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        let mut tables = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let name: String = row
                .get(0)
                .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
            tables.push(name);
        }
        Ok(tables)
    }

    /// Append `rows` to `table` in order, inside one transaction.
    ///
    /// `columns` must name live columns only (the caller intersects its
    /// requested set with [`live_columns`](Self::live_columns) after
    /// reconciliation); each row is aligned positionally with `columns` and
    /// tagged with the crawl reference, source identifier, and ingestion
    /// timestamp. Returns the number of rows stored.
    pub async fn append_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<FieldValue>],
        crawl_id: &CrawlId,
        source_file: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<usize> {
        if !is_valid_identifier(table) {
            return Err(SpiderbaseError::schema(format!(
                "'{table}' is not a valid table identifier"
            )));
        }
        if let Some(bad) = columns.iter().find(|c| !is_valid_identifier(c)) {
            return Err(SpiderbaseError::schema(format!(
                "'{bad}' is not a valid column identifier"
            )));
        }

        if rows.is_empty() {
            return Ok(0);
        }

        let mut names: Vec<&str> = columns.iter().map(String::as_str).collect();
        names.extend(["crawl_id", "processed_at", "source_file"]);
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        );

        let crawl_id = crawl_id.to_string();
        let processed_at = processed_at.to_rfc3339();

        self.storage.begin().await?;
        for row in rows {
            let mut values: Vec<libsql::Value> =
                row.iter().map(field_to_value).collect();
            values.push(libsql::Value::Text(crawl_id.clone()));
            values.push(libsql::Value::Text(processed_at.clone()));
            values.push(libsql::Value::Text(source_file.to_string()));

            if let Err(e) = self
                .storage
                .conn
                .execute(&sql, libsql::params_from_iter(values))
                .await
            {
                self.storage.rollback().await;
                return Err(SpiderbaseError::ingestion(format!(
                    "append to {table} failed: {e}"
                )));
            }
        }
        self.storage.commit().await?;

        debug!(%table, rows = rows.len(), "appended batch");
        Ok(rows.len())
    }

    // -----------------------------------------------------------------------
    // Reconciliation internals
    // -----------------------------------------------------------------------

    /// Drop requested columns with invalid or reserved names, logging each.
    fn admissible_columns(&self, columns: &[ColumnDescriptor]) -> Vec<ColumnDescriptor> {
        columns
            .iter()
            .filter(|col| {
                if !is_valid_identifier(&col.name) {
                    warn!(column = %col.name, "skipping column with invalid identifier");
                    return false;
                }
                if RESERVED_COLUMNS.contains(&col.name.as_str()) {
                    warn!(column = %col.name, "skipping column colliding with a reserved name");
                    return false;
                }
                true
            })
            .cloned()
            .collect()
    }

    async fn create_table(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<ReconcileOutcome> {
        let mut defs: Vec<String> = vec!["id INTEGER PRIMARY KEY".into()];
        defs.extend(
            columns
                .iter()
                .map(|col| format!("{} {}", col.name, col.ty.sql_type())),
        );
        // Fixed provenance columns, present on every result table
        defs.push("crawl_id TEXT".into());
        defs.push("processed_at TEXT DEFAULT (datetime('now'))".into());
        defs.push("source_file TEXT".into());

        let sql = format!("CREATE TABLE {table} ({})", defs.join(", "));
        debug!(%table, sql = %sql, "creating result table");

        self.storage
            .conn
            .execute(&sql, params![])
            .await
            .map_err(|e| SpiderbaseError::schema(format!("create {table}: {e}")))?;

        self.upsert_catalog(table).await?;

        info!(%table, columns = columns.len(), "created result table");
        Ok(ReconcileOutcome::Created)
    }

    async fn reconcile_existing(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<ReconcileOutcome> {
        let live = self.live_columns(table).await?;

        let mut added = Vec::new();
        for col in columns {
            if live.iter().any(|existing| existing == &col.name) {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {table} ADD COLUMN {} {}",
                col.name,
                col.ty.sql_type()
            );
            debug!(%table, column = %col.name, "adding column");
            match self.storage.conn.execute(&sql, params![]).await {
                Ok(_) => added.push(col.name.clone()),
                Err(e) => {
                    // Recoverable locally: skip this column, keep the rest.
                    warn!(%table, column = %col.name, error = %e, "could not add column, skipping");
                }
            }
        }

        if added.is_empty() {
            return Ok(ReconcileOutcome::AlreadySatisfied);
        }

        self.upsert_catalog(table).await?;
        info!(%table, added = ?added, "added columns to result table");
        Ok(ReconcileOutcome::ColumnsAdded(added))
    }

    /// Record the table's live column set in the `table_schemas` catalog,
    /// inside the enclosing reconciliation transaction. Reading the schema
    /// back from the store keeps the catalog honest about skipped additions
    /// and columns added by earlier reconciliations.
    async fn upsert_catalog(&self, table: &str) -> Result<()> {
        let live = self.live_schema(table).await?;
        let columns_json = serde_json::to_string(
            &live
                .iter()
                .map(|(name, ty)| json!({ "name": name, "type": ty }))
                .collect::<Vec<_>>(),
        )
        .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        self.storage
            .conn
            .execute(
                "INSERT INTO table_schemas (table_name, columns, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(table_name) DO UPDATE SET
                   columns = excluded.columns,
                   updated_at = excluded.updated_at",
                params![table, columns_json.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Map a field value to its libSQL parameter form. Timestamps are stored as
/// RFC 3339 text, matching the ledger and log tables.
fn field_to_value(field: &FieldValue) -> libsql::Value {
    match field {
        FieldValue::Null => libsql::Value::Null,
        FieldValue::Number(n) => libsql::Value::Real(*n),
        FieldValue::Timestamp(dt) => libsql::Value::Text(dt.to_rfc3339()),
        FieldValue::Text(s) => libsql::Value::Text(s.clone()),
    }
}
