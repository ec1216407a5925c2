//! Error types for bag reading.

use std::path::PathBuf;

use rb_msg::{ErrorCategory, MsgError};
use rb_table::TableError;
use thiserror::Error;

/// Result type alias for bag operations.
pub type Result<T> = std::result::Result<T, BagError>;

/// Errors from the bag reader, its store and its configuration.
#[derive(Error, Debug)]
pub enum BagError {
    /// No record store at the given path.
    #[error("record store not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The requested topic has no table in the store.
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    /// Operation needs a store but none was connected.
    #[error("not connected to a record store")]
    NotConnected,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Message(#[from] MsgError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file that is not valid JSON for [`crate::BagConfig`].
    #[error("invalid config file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Setting from the environment that cannot be parsed.
    #[error("invalid value '{value}' for {name}")]
    InvalidSetting { name: String, value: String },
}

impl BagError {
    /// Map this error onto the workspace-wide taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            BagError::NotFound(_) | BagError::TopicNotFound(_) => ErrorCategory::NotFound,
            BagError::Message(err) => err.category(),
            BagError::Table(err) => err.category(),
            BagError::Config { .. } => ErrorCategory::Decode,
            BagError::InvalidSetting { .. } => ErrorCategory::SchemaMismatch,
            BagError::NotConnected | BagError::Sqlite(_) | BagError::Io(_) => ErrorCategory::Io,
        }
    }
}
