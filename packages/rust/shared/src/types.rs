//! Core domain types for the spiderbase crawl store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a normalized storage identifier. Crawl exports can
/// carry arbitrarily long header text; anything longer is truncated before
/// it becomes a column name.
pub const MAX_IDENTIFIER_LEN: usize = 64;

// ---------------------------------------------------------------------------
// CrawlId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for crawl identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrawlId(pub Uuid);

impl CrawlId {
    /// Generate a new time-sortable crawl identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CrawlId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CrawlId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CrawlId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Crawl lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a crawl. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Started,
    Completed,
    Failed,
}

impl CrawlStatus {
    /// Stable text form stored in `crawl_metadata.crawl_status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for CrawlStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown crawl status '{other}'")),
        }
    }
}

/// One row of `crawl_metadata`: a single crawl attempt, from start to its
/// terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRecord {
    /// Unique crawl identifier.
    pub id: CrawlId,
    /// Target URL of the crawl.
    pub url: String,
    /// When the crawl started.
    pub crawl_date: DateTime<Utc>,
    /// Configuration reference used, or "default".
    pub config_used: String,
    /// Current lifecycle status.
    pub status: CrawlStatus,
    /// Total item count, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_urls: Option<i64>,
    /// Elapsed time in seconds, set when the crawl closes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time_secs: Option<f64>,
    /// Error detail for failed crawls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// The exact invocation that triggered the crawl, kept verbatim for audit.
    pub command_executed: String,
}

// ---------------------------------------------------------------------------
// Schema value model
// ---------------------------------------------------------------------------

/// Storage type assigned to a result-table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Real,
    Timestamp,
    Text,
}

impl StorageType {
    /// The SQL type name used in CREATE/ALTER statements.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Real => "REAL",
            Self::Timestamp => "TIMESTAMP",
            Self::Text => "TEXT",
        }
    }
}

/// A (name, type) pair used transiently during schema reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Normalized column name (lower-case, underscore-separated).
    pub name: String,
    /// Inferred storage type.
    pub ty: StorageType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, ty: StorageType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A single cell value from a tabular crawl export.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Missing or empty cell.
    Null,
    /// Numeric cell (integers widen to f64, matching the REAL column type).
    Number(f64),
    /// Date/time-typed cell.
    Timestamp(DateTime<Utc>),
    /// Everything else.
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A batch of tabular records sharing one header: the unit of ingestion.
///
/// Column order follows the source header; row order is append order.
#[derive(Debug, Clone, Default)]
pub struct TabularBatch {
    /// Raw field names as they appeared in the source header.
    pub columns: Vec<String>,
    /// Rows, each aligned positionally with `columns`.
    pub rows: Vec<Vec<FieldValue>>,
}

impl TabularBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sample value for a column index, taken from the first row.
    pub fn sample(&self, idx: usize) -> Option<&FieldValue> {
        self.rows.first().and_then(|row| row.get(idx))
    }
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

/// Kind of maintenance operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceKind {
    Optimize,
    Cleanup,
}

impl MaintenanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimize => "optimize",
            Self::Cleanup => "cleanup",
        }
    }
}

/// Status of a maintenance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    InProgress,
    Completed,
    Failed,
}

impl MaintenanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for MaintenanceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown maintenance status '{other}'")),
        }
    }
}

/// One row of `maintenance_log`: a single maintenance attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceLogEntry {
    pub id: String,
    pub operation: MaintenanceKind,
    pub details: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: MaintenanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Identifier normalization
// ---------------------------------------------------------------------------

/// Normalize raw header text into a storage identifier.
///
/// Trims, lower-cases, maps spaces and hyphens to underscores (runs collapse
/// to one), then drops every character outside `[a-z0-9_]`. A digit-leading
/// result gets a `c_` prefix and the whole thing is capped at
/// [`MAX_IDENTIFIER_LEN`]. Returns `None` when nothing usable survives.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        let ch = ch.to_ascii_lowercase();
        match ch {
            ' ' | '-' | '_' => {
                if !out.ends_with('_') {
                    out.push('_');
                }
            }
            'a'..='z' | '0'..='9' => out.push(ch),
            _ => {}
        }
    }

    if out.chars().all(|c| c == '_') {
        return None;
    }

    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "c_");
    }

    out.truncate(MAX_IDENTIFIER_LEN);
    Some(out)
}

/// Whether `name` is already a valid normalized storage identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name.starts_with(|c: char| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.chars().all(|c| c == '_')
}
