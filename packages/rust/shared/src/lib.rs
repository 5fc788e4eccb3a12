//! Shared types, error model, and configuration for spiderbase.
//!
//! This crate is the foundation depended on by all other spiderbase crates.
//! It provides:
//! - [`SpiderbaseError`] — the unified error type
//! - Domain types ([`CrawlRecord`], [`CrawlId`], [`TabularBatch`],
//!   [`ColumnDescriptor`], maintenance log types)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, IngestConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{Result, SpiderbaseError};
pub use types::{
    ColumnDescriptor, CrawlId, CrawlRecord, CrawlStatus, FieldValue, MAX_IDENTIFIER_LEN,
    MaintenanceKind, MaintenanceLogEntry, MaintenanceStatus, StorageType, TabularBatch,
    is_valid_identifier, normalize_identifier,
};
