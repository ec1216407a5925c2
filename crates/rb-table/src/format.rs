//! Cache file formats.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TableError;

/// On-disk format of a topic cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheFormat {
    #[default]
    Parquet,
    /// Arrow IPC file (Feather v2).
    Feather,
    Csv,
    /// Array of row objects.
    Json,
}

impl CacheFormat {
    /// Every supported format.
    pub const ALL: [CacheFormat; 4] = [
        CacheFormat::Parquet,
        CacheFormat::Feather,
        CacheFormat::Csv,
        CacheFormat::Json,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheFormat::Parquet => "parquet",
            CacheFormat::Feather => "feather",
            CacheFormat::Csv => "csv",
            CacheFormat::Json => "json",
        }
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Whether the file itself records column types. CSV and JSON caches
    /// get a schema sidecar instead.
    pub fn carries_schema(&self) -> bool {
        matches!(self, CacheFormat::Parquet | CacheFormat::Feather)
    }
}

impl fmt::Display for CacheFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CacheFormat {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parquet" => Ok(CacheFormat::Parquet),
            "feather" => Ok(CacheFormat::Feather),
            "csv" => Ok(CacheFormat::Csv),
            "json" => Ok(CacheFormat::Json),
            _ => Err(TableError::UnsupportedFormat(s.to_string())),
        }
    }
}
