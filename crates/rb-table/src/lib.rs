//! Topic tables and their on-disk caches.
//!
//! This crate provides:
//! - Arrow schema inference for flat `path -> scalar` rows
//! - [`TopicTable`], one record batch per topic
//! - Atomic cache writes and reads for Parquet, Feather, CSV and JSON
//! - Schema sidecars so CSV and JSON caches read back with their column types

pub mod error;
pub mod format;
pub mod reader;
pub mod schema;
pub mod sidecar;
pub mod table;
pub mod writer;

pub use error::{Result, TableError};
pub use format::CacheFormat;
pub use reader::read_table;
pub use schema::{ColumnLayout, ColumnType};
pub use sidecar::{read_sidecar, sidecar_path, write_sidecar};
pub use table::TopicTable;
pub use writer::{atomic_rename, temp_path_for, write_table, WriterConfig};
