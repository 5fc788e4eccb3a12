//! Storage maintenance: compaction and retention-based cleanup.
//!
//! Each operation brackets its work with a `maintenance_log` row: inserted
//! as `in_progress` before any work, updated to `completed` or `failed` with
//! the error text afterwards. No entry is left `in_progress` after a clean
//! exit. Maintenance runs independently of ingestion and should be scheduled
//! when no ingestion is in flight.

use chrono::{Duration, Utc};
use libsql::params;
use spiderbase_shared::{
    MaintenanceKind, MaintenanceLogEntry, MaintenanceStatus, Result, SpiderbaseError,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{SchemaRegistry, Storage};

/// Per-table deletion counts from a cleanup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// (result table, rows deleted) for every catalogued table.
    pub per_table: Vec<(String, u64)>,
    /// Expired `crawl_metadata` rows deleted.
    pub crawls_deleted: u64,
}

/// Performs storage compaction and retention-based deletion.
pub struct MaintenanceScheduler<'a> {
    storage: &'a Storage,
}

impl<'a> MaintenanceScheduler<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Full storage compaction and statistics refresh: VACUUM, ANALYZE,
    /// `PRAGMA optimize`.
    ///
    /// VACUUM must run outside any transaction; each statement is atomic on
    /// its own, so a failure leaves the store untouched apart from the log
    /// row marking the attempt failed.
    pub async fn optimize(&self) -> Result<()> {
        self.storage.check_writable()?;
        let log_id = self
            .open_log(MaintenanceKind::Optimize, "regular database optimization")
            .await?;

        for stmt in ["VACUUM", "ANALYZE", "PRAGMA optimize"] {
            if let Err(e) = self.storage.conn.execute(stmt, params![]).await {
                let msg = format!("{stmt} failed: {e}");
                self.close_log(&log_id, MaintenanceStatus::Failed, Some(&msg))
                    .await?;
                return Err(SpiderbaseError::Maintenance(msg));
            }
        }

        self.close_log(&log_id, MaintenanceStatus::Completed, None)
            .await?;
        info!("database optimization completed");
        Ok(())
    }

    /// Delete crawl records older than `retention_days`, and their dependent
    /// result rows, from every table known to the schema catalog.
    ///
    /// Destructive and irreversible. Each result table is cleaned inside its
    /// own transaction; counts are reported only for fully committed tables.
    pub async fn cleanup(&self, retention_days: u32) -> Result<CleanupReport> {
        self.storage.check_writable()?;
        let log_id = self
            .open_log(
                MaintenanceKind::Cleanup,
                &format!("removing records older than {retention_days} days"),
            )
            .await?;

        let cutoff = (Utc::now() - Duration::days(i64::from(retention_days))).to_rfc3339();
        let tables = SchemaRegistry::new(self.storage).list_result_tables().await?;

        let mut per_table = Vec::with_capacity(tables.len());
        for table in &tables {
            match self.clean_table(table, &cutoff).await {
                Ok(deleted) => {
                    info!(%table, deleted, "cleaned result table");
                    per_table.push((table.clone(), deleted));
                }
                Err(e) => {
                    let msg = format!("cleanup of {table} failed: {e}");
                    self.close_log(&log_id, MaintenanceStatus::Failed, Some(&msg))
                        .await?;
                    return Err(SpiderbaseError::Maintenance(msg));
                }
            }
        }

        let crawls_deleted = match self
            .storage
            .conn
            .execute(
                "DELETE FROM crawl_metadata WHERE crawl_date < ?1",
                params![cutoff.as_str()],
            )
            .await
        {
            Ok(deleted) => deleted,
            Err(e) => {
                let msg = format!("cleanup of crawl_metadata failed: {e}");
                self.close_log(&log_id, MaintenanceStatus::Failed, Some(&msg))
                    .await?;
                return Err(SpiderbaseError::Maintenance(msg));
            }
        };

        self.close_log(&log_id, MaintenanceStatus::Completed, None)
            .await?;
        info!(crawls_deleted, tables = per_table.len(), "cleanup completed");

        Ok(CleanupReport {
            per_table,
            crawls_deleted,
        })
    }

    /// Delete one result table's expired rows inside a single transaction.
    async fn clean_table(&self, table: &str, cutoff: &str) -> Result<u64> {
        self.storage.begin().await?;
        let deleted = match self
            .storage
            .conn
            .execute(
                &format!(
                    "DELETE FROM {table} WHERE crawl_id IN
                       (SELECT id FROM crawl_metadata WHERE crawl_date < ?1)"
                ),
                params![cutoff],
            )
            .await
        {
            Ok(deleted) => deleted,
            Err(e) => {
                self.storage.rollback().await;
                return Err(SpiderbaseError::Storage(e.to_string()));
            }
        };
        self.storage.commit().await?;
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Maintenance log bookkeeping
    // -----------------------------------------------------------------------

    async fn open_log(&self, kind: MaintenanceKind, details: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.storage
            .conn
            .execute(
                "INSERT INTO maintenance_log (id, operation, details, started_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_str(),
                    kind.as_str(),
                    details,
                    now.as_str(),
                    MaintenanceStatus::InProgress.as_str()
                ],
            )
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
        Ok(id)
    }

    async fn close_log(
        &self,
        log_id: &str,
        status: MaintenanceStatus,
        error: Option<&str>,
    ) -> Result<()> {
        if let Some(error) = error {
            warn!(log_id, error, "maintenance operation failed");
        }
        let now = Utc::now().to_rfc3339();
        self.storage
            .conn
            .execute(
                "UPDATE maintenance_log
                 SET status = ?1, completed_at = ?2, error_message = ?3
                 WHERE id = ?4",
                params![status.as_str(), now.as_str(), error, log_id],
            )
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recent maintenance log entries, newest first.
    pub async fn recent_log_entries(&self, limit: u32) -> Result<Vec<MaintenanceLogEntry>> {
        let mut rows = self
            .storage
            .conn
            .query(
                "SELECT id, operation, details, started_at, completed_at, status, error_message
                 FROM maintenance_log ORDER BY started_at DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            entries.push(row_to_log_entry(&row)?);
        }
        Ok(entries)
    }
}

fn row_to_log_entry(row: &libsql::Row) -> Result<MaintenanceLogEntry> {
    let operation: String = row
        .get(1)
        .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
    let status: String = row
        .get(5)
        .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

    let parse_ts = |s: String| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| SpiderbaseError::Storage(format!("invalid date: {e}")))
    };

    Ok(MaintenanceLogEntry {
        id: row
            .get(0)
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?,
        operation: match operation.as_str() {
            "optimize" => MaintenanceKind::Optimize,
            "cleanup" => MaintenanceKind::Cleanup,
            other => {
                return Err(SpiderbaseError::Storage(format!(
                    "unknown maintenance operation '{other}'"
                )));
            }
        },
        details: row.get::<String>(2).unwrap_or_default(),
        started_at: {
            let s: String = row
                .get(3)
                .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
            parse_ts(s)?
        },
        completed_at: match row.get::<String>(4).ok() {
            Some(s) => Some(parse_ts(s)?),
            None => None,
        },
        status: status
            .parse()
            .map_err(|e| SpiderbaseError::Storage(format!("{e}")))?,
        error_message: row.get::<String>(6).ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_storage;
    use crate::{CrawlLedger, ReconcileOutcome};
    use spiderbase_shared::{ColumnDescriptor, CrawlId, StorageType};

    /// Insert a crawl record whose crawl_date lies `age_days` in the past.
    async fn aged_crawl(storage: &Storage, age_days: i64) -> CrawlId {
        let id = CrawlId::new();
        let date = (Utc::now() - Duration::days(age_days)).to_rfc3339();
        storage
            .conn
            .execute(
                "INSERT INTO crawl_metadata
                   (id, url, crawl_date, config_used, crawl_status, command_executed)
                 VALUES (?1, 'https://example.com', ?2, 'default', 'completed', 'spider')",
                params![id.to_string(), date.as_str()],
            )
            .await
            .expect("insert aged crawl");
        id
    }

    async fn result_row(storage: &Storage, table: &str, crawl_id: &CrawlId) {
        storage
            .conn
            .execute(
                &format!("INSERT INTO {table} (url, crawl_id) VALUES ('https://x', ?1)"),
                params![crawl_id.to_string()],
            )
            .await
            .expect("insert result row");
    }

    async fn count_rows(storage: &Storage, table: &str) -> i64 {
        let mut rows = storage
            .conn
            .query(&format!("SELECT COUNT(*) FROM {table}"), params![])
            .await
            .expect("count query");
        let row = rows.next().await.expect("row").expect("some");
        row.get::<i64>(0).expect("count value")
    }

    #[tokio::test]
    async fn optimize_logs_completed() {
        let storage = test_storage().await;
        let scheduler = MaintenanceScheduler::new(&storage);

        scheduler.optimize().await.expect("optimize");

        let entries = scheduler.recent_log_entries(10).await.expect("log");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, MaintenanceKind::Optimize);
        assert_eq!(entries[0].status, MaintenanceStatus::Completed);
        assert!(entries[0].completed_at.is_some());
        assert!(entries[0].error_message.is_none());
    }

    #[tokio::test]
    async fn cleanup_respects_retention_window() {
        let storage = test_storage().await;

        let registry = SchemaRegistry::new(&storage);
        let outcome = registry
            .ensure_table(
                "sb_internal_all",
                &[ColumnDescriptor::new("url", StorageType::Text)],
            )
            .await
            .expect("ensure");
        assert_eq!(outcome, ReconcileOutcome::Created);

        // Crawls dated 10, 40, and 400 days ago, one result row each.
        let fresh = aged_crawl(&storage, 10).await;
        let stale = aged_crawl(&storage, 40).await;
        let ancient = aged_crawl(&storage, 400).await;
        for id in [&fresh, &stale, &ancient] {
            result_row(&storage, "sb_internal_all", id).await;
        }

        let scheduler = MaintenanceScheduler::new(&storage);
        let report = scheduler.cleanup(30).await.expect("cleanup");

        assert_eq!(report.crawls_deleted, 2);
        assert_eq!(report.per_table, vec![("sb_internal_all".to_string(), 2)]);

        // The 10-day crawl and its dependent row survive.
        let ledger = CrawlLedger::new(&storage);
        assert!(ledger.get(&fresh).await.expect("get").is_some());
        assert!(ledger.get(&stale).await.expect("get").is_none());
        assert!(ledger.get(&ancient).await.expect("get").is_none());
        assert_eq!(count_rows(&storage, "sb_internal_all").await, 1);
    }

    #[tokio::test]
    async fn cleanup_with_empty_catalog_only_touches_metadata() {
        let storage = test_storage().await;
        let old = aged_crawl(&storage, 90).await;

        let scheduler = MaintenanceScheduler::new(&storage);
        let report = scheduler.cleanup(30).await.expect("cleanup");

        assert!(report.per_table.is_empty());
        assert_eq!(report.crawls_deleted, 1);
        assert!(
            CrawlLedger::new(&storage)
                .get(&old)
                .await
                .expect("get")
                .is_none()
        );
    }

    #[tokio::test]
    async fn cleanup_failure_closes_log_as_failed() {
        let storage = test_storage().await;
        aged_crawl(&storage, 90).await;

        // Make the crawl_metadata deletion fail mid-cleanup.
        storage
            .conn
            .execute(
                "CREATE TRIGGER block_crawl_delete BEFORE DELETE ON crawl_metadata
                 BEGIN SELECT RAISE(ABORT, 'delete blocked'); END",
                params![],
            )
            .await
            .expect("create trigger");

        let scheduler = MaintenanceScheduler::new(&storage);
        let result = scheduler.cleanup(30).await;
        assert!(matches!(result, Err(SpiderbaseError::Maintenance(_))));

        // The log row must not be stranded in_progress.
        let entries = scheduler.recent_log_entries(10).await.expect("log");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, MaintenanceStatus::Failed);
        assert!(entries[0].completed_at.is_some());
        assert!(
            entries[0]
                .error_message
                .as_deref()
                .is_some_and(|msg| msg.contains("crawl_metadata"))
        );
    }

    #[tokio::test]
    async fn cleanup_logs_completed_entry() {
        let storage = test_storage().await;
        let scheduler = MaintenanceScheduler::new(&storage);

        scheduler.cleanup(30).await.expect("cleanup");

        let entries = scheduler.recent_log_entries(10).await.expect("log");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, MaintenanceKind::Cleanup);
        assert_eq!(entries[0].status, MaintenanceStatus::Completed);
        assert!(entries[0].details.contains("30 days"));
    }
}
