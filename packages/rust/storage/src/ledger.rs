//! Crawl ledger: lifecycle records for every crawl attempt.
//!
//! State machine: `started -> {completed, failed}`, both terminal. Terminal
//! transitions are guarded UPDATEs, so a second close of the same crawl is a
//! no-op and there is no read-modify-write race. Closing an unknown id is
//! logged and swallowed — metadata bookkeeping must never abort an otherwise
//! successful crawl.

use chrono::Utc;
use libsql::params;
use spiderbase_shared::{CrawlId, CrawlRecord, CrawlStatus, Result, SpiderbaseError};
use tracing::{debug, info, warn};

use crate::Storage;

/// Records crawl lifecycle (started/completed/failed) with timing and the
/// triggering command, as an append-mostly metadata table.
pub struct CrawlLedger<'a> {
    storage: &'a Storage,
}

impl<'a> CrawlLedger<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Insert a started record and return its identifier. This is the only
    /// creation path for crawl records.
    pub async fn begin(
        &self,
        url: &str,
        config_ref: Option<&str>,
        command: &str,
    ) -> Result<CrawlId> {
        self.storage.check_writable()?;

        let id = CrawlId::new();
        let now = Utc::now().to_rfc3339();
        let config_used = config_ref.unwrap_or("default");

        self.storage
            .conn
            .execute(
                "INSERT INTO crawl_metadata
                   (id, url, crawl_date, config_used, crawl_status, command_executed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    url,
                    now.as_str(),
                    config_used,
                    CrawlStatus::Started.as_str(),
                    command
                ],
            )
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        info!(crawl_id = %id, url, config_used, "crawl started");
        Ok(id)
    }

    /// Transition `started -> completed`, recording elapsed time.
    pub async fn complete(&self, id: &CrawlId, elapsed_secs: f64) -> Result<()> {
        self.close(id, CrawlStatus::Completed, elapsed_secs, None).await
    }

    /// Transition `started -> failed`, recording elapsed time and the error.
    pub async fn fail(&self, id: &CrawlId, elapsed_secs: f64, error: &str) -> Result<()> {
        self.close(id, CrawlStatus::Failed, elapsed_secs, Some(error))
            .await
    }

    async fn close(
        &self,
        id: &CrawlId,
        status: CrawlStatus,
        elapsed_secs: f64,
        error: Option<&str>,
    ) -> Result<()> {
        self.storage.check_writable()?;

        // Guarded transition: only a started crawl can be closed.
        let affected = self
            .storage
            .conn
            .execute(
                "UPDATE crawl_metadata
                 SET crawl_status = ?1, completion_time_secs = ?2, error_message = ?3
                 WHERE id = ?4 AND crawl_status = ?5",
                params![
                    status.as_str(),
                    elapsed_secs,
                    error,
                    id.to_string(),
                    CrawlStatus::Started.as_str()
                ],
            )
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        if affected == 0 {
            match self.get(id).await? {
                Some(record) => {
                    // Idempotent terminal close: the record keeps its first outcome.
                    debug!(crawl_id = %id, status = record.status.as_str(), "crawl already closed");
                }
                None => {
                    warn!(crawl_id = %id, "cannot close unknown crawl id");
                }
            }
            return Ok(());
        }

        info!(
            crawl_id = %id,
            status = status.as_str(),
            elapsed_secs,
            "crawl closed"
        );
        Ok(())
    }

    /// Set the total item count once known. Unknown ids are logged and
    /// swallowed, like terminal transitions.
    pub async fn record_item_count(&self, id: &CrawlId, total: i64) -> Result<()> {
        self.storage.check_writable()?;

        let affected = self
            .storage
            .conn
            .execute(
                "UPDATE crawl_metadata SET total_urls = ?1 WHERE id = ?2",
                params![total, id.to_string()],
            )
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        if affected == 0 {
            warn!(crawl_id = %id, "cannot record item count for unknown crawl id");
        }
        Ok(())
    }

    /// Fetch a crawl record by id.
    pub async fn get(&self, id: &CrawlId) -> Result<Option<CrawlRecord>> {
        let mut rows = self
            .storage
            .conn
            .query(
                "SELECT id, url, crawl_date, config_used, crawl_status,
                        total_urls, completion_time_secs, error_message, command_executed
                 FROM crawl_metadata WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_crawl_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(SpiderbaseError::Storage(e.to_string())),
        }
    }
}

/// Convert a database row to a [`CrawlRecord`].
fn row_to_crawl_record(row: &libsql::Row) -> Result<CrawlRecord> {
    let id: String = row
        .get(0)
        .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
    let status: String = row
        .get(4)
        .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;

    Ok(CrawlRecord {
        id: id
            .parse()
            .map_err(|e| SpiderbaseError::Storage(format!("invalid crawl id: {e}")))?,
        url: row
            .get(1)
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?,
        crawl_date: {
            let s: String = row
                .get(2)
                .map_err(|e| SpiderbaseError::Storage(e.to_string()))?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| SpiderbaseError::Storage(format!("invalid date: {e}")))?
        },
        config_used: row
            .get(3)
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?,
        status: status
            .parse()
            .map_err(|e| SpiderbaseError::Storage(format!("{e}")))?,
        total_urls: row.get::<i64>(5).ok(),
        completion_time_secs: row.get::<f64>(6).ok(),
        error_message: row.get::<String>(7).ok(),
        command_executed: row
            .get(8)
            .map_err(|e| SpiderbaseError::Storage(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_storage;

    #[tokio::test]
    async fn begin_then_complete() {
        let storage = test_storage().await;
        let ledger = CrawlLedger::new(&storage);

        let id = ledger
            .begin("https://example.com", None, "spider --crawl https://example.com")
            .await
            .expect("begin");

        let record = ledger.get(&id).await.expect("get").expect("exists");
        assert_eq!(record.status, CrawlStatus::Started);
        assert_eq!(record.config_used, "default");
        assert!(record.completion_time_secs.is_none());

        ledger.complete(&id, 42.5).await.expect("complete");

        let record = ledger.get(&id).await.expect("get").expect("exists");
        assert_eq!(record.status, CrawlStatus::Completed);
        assert_eq!(record.completion_time_secs, Some(42.5));
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn terminal_close_is_idempotent() {
        let storage = test_storage().await;
        let ledger = CrawlLedger::new(&storage);

        let id = ledger
            .begin("https://example.com", Some("custom.cfg"), "spider")
            .await
            .expect("begin");
        ledger.complete(&id, 10.0).await.expect("first close");

        // Second completion and a late failure both leave the record unchanged.
        ledger.complete(&id, 99.0).await.expect("second close");
        ledger.fail(&id, 99.0, "late error").await.expect("late fail");

        let record = ledger.get(&id).await.expect("get").expect("exists");
        assert_eq!(record.status, CrawlStatus::Completed);
        assert_eq!(record.completion_time_secs, Some(10.0));
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn fail_records_error_detail() {
        let storage = test_storage().await;
        let ledger = CrawlLedger::new(&storage);

        let id = ledger
            .begin("https://example.com", None, "spider")
            .await
            .expect("begin");
        ledger
            .fail(&id, 3.0, "crawler exited with status 2")
            .await
            .expect("fail");

        let record = ledger.get(&id).await.expect("get").expect("exists");
        assert_eq!(record.status, CrawlStatus::Failed);
        assert_eq!(
            record.error_message.as_deref(),
            Some("crawler exited with status 2")
        );
    }

    #[tokio::test]
    async fn unknown_id_close_is_silent() {
        let storage = test_storage().await;
        let ledger = CrawlLedger::new(&storage);

        let ghost = CrawlId::new();
        ledger.complete(&ghost, 1.0).await.expect("complete unknown");
        ledger.fail(&ghost, 1.0, "nope").await.expect("fail unknown");
        ledger
            .record_item_count(&ghost, 5)
            .await
            .expect("count unknown");
        assert!(ledger.get(&ghost).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn item_count_recorded() {
        let storage = test_storage().await;
        let ledger = CrawlLedger::new(&storage);

        let id = ledger
            .begin("https://example.com", None, "spider")
            .await
            .expect("begin");
        ledger.record_item_count(&id, 1234).await.expect("count");

        let record = ledger.get(&id).await.expect("get").expect("exists");
        assert_eq!(record.total_urls, Some(1234));
    }
}
