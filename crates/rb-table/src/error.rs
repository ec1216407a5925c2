//! Error types for table building and cache I/O.

use rb_msg::ErrorCategory;
use thiserror::Error;

/// Result type alias for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// Errors from table construction and cache file operations.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported cache format '{0}' (expected parquet, feather, csv or json)")]
    UnsupportedFormat(String),

    /// Column whose Arrow type has no [`crate::ColumnType`] equivalent.
    #[error("column '{column}' has type {data_type}, which a schema sidecar cannot describe")]
    UnsupportedColumn { column: String, data_type: String },
}

impl TableError {
    /// Map this error onto the workspace-wide taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TableError::UnsupportedFormat(_) => ErrorCategory::UnsupportedFormat,
            TableError::Json(_) => ErrorCategory::Decode,
            TableError::UnsupportedColumn { .. } => ErrorCategory::SchemaMismatch,
            TableError::Io(_) | TableError::Parquet(_) | TableError::Arrow(_) => {
                ErrorCategory::Io
            }
        }
    }
}
