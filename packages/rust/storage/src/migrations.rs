//! SQL migration definitions for the spiderbase database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.
//! These create only the base infrastructure tables; result tables are
//! defined dynamically by the schema registry at ingest time.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Base schema: crawl_metadata, table_schemas catalog, maintenance_log",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per crawl attempt (the crawl ledger)
CREATE TABLE IF NOT EXISTS crawl_metadata (
    id                   TEXT PRIMARY KEY,
    url                  TEXT NOT NULL,
    crawl_date           TEXT NOT NULL,
    config_used          TEXT NOT NULL,
    crawl_status         TEXT NOT NULL,
    total_urls           INTEGER,
    completion_time_secs REAL,
    error_message        TEXT,
    command_executed     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_metadata_date ON crawl_metadata(crawl_date);
CREATE INDEX IF NOT EXISTS idx_crawl_metadata_status ON crawl_metadata(crawl_status);

-- Catalog of dynamically created result tables and their column sets
CREATE TABLE IF NOT EXISTS table_schemas (
    table_name TEXT PRIMARY KEY,
    columns    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per maintenance attempt
CREATE TABLE IF NOT EXISTS maintenance_log (
    id            TEXT PRIMARY KEY,
    operation     TEXT NOT NULL,
    details       TEXT,
    started_at    TEXT NOT NULL,
    completed_at  TEXT,
    status        TEXT NOT NULL,
    error_message TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
