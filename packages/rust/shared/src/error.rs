//! Error types for spiderbase.
//!
//! Library crates use [`SpiderbaseError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Closing an unknown crawl id has no variant here on purpose: ledger
//! bookkeeping is logged and swallowed, never propagated.

use std::path::PathBuf;

/// Top-level error type for all spiderbase operations.
#[derive(Debug, thiserror::Error)]
pub enum SpiderbaseError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Schema reconciliation error (column add rejected, bad identifier).
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Ingestion error (unparsable batch, append failure after
    /// reconciliation succeeded). Surfaced to the caller.
    #[error("ingestion error: {message}")]
    Ingestion { message: String },

    /// Maintenance operation error (compaction or cleanup failure).
    #[error("maintenance error: {0}")]
    Maintenance(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad identifier, invalid argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpiderbaseError>;

impl SpiderbaseError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a schema error from any displayable message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    /// Create an ingestion error from any displayable message.
    pub fn ingestion(msg: impl Into<String>) -> Self {
        Self::Ingestion {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
