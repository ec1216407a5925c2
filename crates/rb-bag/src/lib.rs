//! rosbag2 record store reader.
//!
//! This crate provides:
//! - Read-only access to rosbag2 SQLite stores (`topics` / `messages`)
//! - [`BagReader`]: per-topic extraction into flat [`rb_table::TopicTable`]s
//!   with on-disk caches next to the store
//! - Layered [`BagConfig`] resolution and `tracing` subscriber setup

pub mod config;
pub mod error;
pub mod logging;
pub mod reader;
pub mod store;
pub mod time;

pub use config::{
    resolve_config, resolve_config_with, xdg_config_dir, BagConfig, CacheScope, ConfigSource,
    ProgressMode, ResolvedConfig,
};
pub use error::{BagError, Result};
pub use logging::{init_default_logging, init_logging, LogConfig, LogFormat, LogLevel};
pub use reader::{BagReader, TopicKeys, MSEC_COLUMN, ROW_TIME_COLUMN};
pub use store::{locate_store, MessageRecord, RecordStore, Topic, STORE_EXTENSION};
pub use time::{cache_file, msec, row_time, sanitize_topic_name};

pub use rb_table::CacheFormat;
