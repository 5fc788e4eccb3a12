//! Ingestion of tabular crawl exports into the spiderbase store.
//!
//! This crate owns the read-side of the engine:
//! - [`infer`] — storage type inference from column names and samples
//! - [`naming`] — table/field identifier derivation
//! - [`reader`] — delimited export file parsing
//! - [`IngestionPipeline`] — batch ingestion through the schema registry

pub mod infer;
pub mod naming;
pub mod pipeline;
pub mod reader;

pub use naming::{TABLE_PREFIX, derive_table_name, normalize_field_name};
pub use pipeline::IngestionPipeline;
pub use reader::{read_delimited, read_delimited_file};
