//! libSQL storage layer for crawl results.
//!
//! The [`Storage`] struct wraps a libSQL database holding the crawl ledger
//! (`crawl_metadata`), dynamically defined result tables, the schema catalog
//! (`table_schemas`), and the maintenance log.
//!
//! **Access rules:**
//! - Engine and CLI: read-write (sole writer) via [`Storage::open`]
//! - External inspectors: read-only via [`Storage::open_readonly`]
//!
//! The handle is passed explicitly to every component; there is no global
//! connection and no process-local schema cache. Schema state is re-queried
//! from the store before each reconciliation decision.

mod ledger;
mod maintenance;
mod migrations;
mod registry;

pub use ledger::CrawlLedger;
pub use maintenance::{CleanupReport, MaintenanceScheduler};
pub use registry::{ReconcileOutcome, SchemaRegistry};

use std::path::Path;

use spiderbase_shared::{Result, SpiderbaseError};
use libsql::{Connection, Database, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    pub(crate) conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SpiderbaseError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for external inspectors).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    SpiderbaseError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SpiderbaseError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transaction scope
    // -----------------------------------------------------------------------

    /// Begin an immediate write transaction. The store itself is the only
    /// serialization point: one logical operation holds the write path at a
    /// time.
    pub(crate) async fn begin(&self) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("BEGIN IMMEDIATE", params![])
            .await
            .map_err(|e| SpiderbaseError::Storage(format!("begin: {e}")))?;
        Ok(())
    }

    /// Commit the open transaction.
    pub(crate) async fn commit(&self) -> Result<()> {
        self.conn
            .execute("COMMIT", params![])
            .await
            .map_err(|e| SpiderbaseError::Storage(format!("commit: {e}")))?;
        Ok(())
    }

    /// Roll back the open transaction. A failed rollback is logged, not
    /// propagated: the caller is already on an error path.
    pub(crate) async fn rollback(&self) {
        if let Err(e) = self.conn.execute("ROLLBACK", params![]).await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_storage;

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sb_test_{}.db", uuid::Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.schema_version().await, 1);
    }

    #[tokio::test]
    async fn base_tables_exist() {
        let storage = test_storage().await;
        for table in ["crawl_metadata", "table_schemas", "maintenance_log"] {
            let mut rows = storage
                .conn
                .query(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                )
                .await
                .expect("query sqlite_master");
            assert!(
                rows.next().await.expect("row").is_some(),
                "missing base table {table}"
            );
        }
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("sb_test_{}.db", uuid::Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.expect("open rw");
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.expect("open ro");
        let result = CrawlLedger::new(&ro)
            .begin("https://example.com", None, "spider --crawl")
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
