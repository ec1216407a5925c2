//! Bag reader: per-topic extraction with a cache short-circuit.
//!
//! A reader moves through `disconnected -> connected -> reading -> idle`.
//! [`BagReader::topic_table`] skips the `reading` step entirely when a cache
//! file for the configured format already sits next to the store; otherwise
//! it extracts every topic, closes the connection, writes caches and hands
//! back the requested table.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rb_msg::{
    flatten, message_to_dict, CdrDeserializer, Dict, MessageDeserializer, MessageSchema,
    SchemaResolver,
};
use rb_table::{read_table, write_table, CacheFormat, TopicTable, WriterConfig};
use tracing::{debug, info, warn};

use crate::config::{BagConfig, CacheScope, ProgressMode};
use crate::error::{BagError, Result};
use crate::store::{locate_store, RecordStore, Topic};
use crate::time::{cache_file, msec, row_time};

/// Column holding the local wall-clock time of a record.
pub const ROW_TIME_COLUMN: &str = "row_time";
/// Column holding milliseconds since the topic's first record.
pub const MSEC_COLUMN: &str = "msec";

type SharedResolver = Arc<dyn SchemaResolver + Send + Sync>;
type BoxedDeserializer = Box<dyn MessageDeserializer + Send + Sync>;

/// Leaf key paths of one topic's sample record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicKeys {
    pub topic: String,
    pub type_name: String,
    /// Empty when the topic has no records or the sample failed to decode.
    pub keys: Vec<String>,
}

impl fmt::Display for TopicKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.topic)?;
        for key in &self.keys {
            write!(f, "\n  - {key}")?;
        }
        Ok(())
    }
}

/// Reads topics out of a rosbag2 record store into [`TopicTable`]s.
pub struct BagReader {
    resolver: SharedResolver,
    deserializer: BoxedDeserializer,
    config: BagConfig,
    writer_config: WriterConfig,
    /// Store file chosen by the last successful `connect`.
    location: Option<PathBuf>,
    store: Option<RecordStore>,
}

impl fmt::Debug for BagReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BagReader")
            .field("config", &self.config)
            .field("location", &self.location)
            .field("connected", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl BagReader {
    /// Reader decoding CDR payloads with types from `resolver`.
    pub fn new<R>(resolver: R) -> Self
    where
        R: SchemaResolver + Send + Sync + 'static,
    {
        let resolver: SharedResolver = Arc::new(resolver);
        let deserializer = Box::new(CdrDeserializer::new(Arc::clone(&resolver)));
        BagReader {
            resolver,
            deserializer,
            config: BagConfig::default(),
            writer_config: WriterConfig::default(),
            location: None,
            store: None,
        }
    }

    pub fn with_config(mut self, config: BagConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the payload decoder.
    pub fn with_deserializer<D>(mut self, deserializer: D) -> Self
    where
        D: MessageDeserializer + Send + Sync + 'static,
    {
        self.deserializer = Box::new(deserializer);
        self
    }

    /// Parquet settings for cache writes.
    pub fn with_writer_config(mut self, writer_config: WriterConfig) -> Self {
        self.writer_config = writer_config;
        self
    }

    pub fn config(&self) -> &BagConfig {
        &self.config
    }

    /// Open the store at `path`: a `.db3` file or a directory holding one.
    ///
    /// On failure the reader is left disconnected.
    pub fn connect(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.close()?;
        self.location = None;
        let store_path = locate_store(path.as_ref())?;
        let store = RecordStore::open(&store_path)?;
        info!(path = %store_path.display(), "Connected to record store");
        self.location = Some(store_path);
        self.store = Some(store);
        Ok(())
    }

    /// Close the connection; the store location is kept for cache lookups.
    pub fn close(&mut self) -> Result<()> {
        if let Some(store) = self.store.take() {
            store.close()?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    /// Store file of the last successful `connect`.
    pub fn store_path(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Directory cache files are written to: the store's directory.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.location.as_deref().and_then(Path::parent)
    }

    /// Cache file of `topic` in `format`.
    pub fn cache_path(&self, topic: &str, format: CacheFormat) -> Result<PathBuf> {
        let dir = self.cache_dir().ok_or(BagError::NotConnected)?;
        Ok(cache_file(dir, topic, format))
    }

    fn connected_store(&self) -> Result<&RecordStore> {
        self.store.as_ref().ok_or(BagError::NotConnected)
    }

    /// Decode one sample record per topic and report its flattened keys.
    pub fn list_topic_keys(&self) -> Result<Vec<TopicKeys>> {
        let store = self.connected_store()?;
        let mut listing = Vec::new();
        for topic in store.topics()? {
            let keys = match self.sample_keys(store, &topic) {
                Ok(keys) => keys,
                Err(err) => {
                    warn!(topic = %topic.name, error = %err, "Could not decode sample record");
                    Vec::new()
                }
            };
            let entry = TopicKeys {
                topic: topic.name,
                type_name: topic.type_name,
                keys,
            };
            info!(topic = %entry.topic, keys = entry.keys.len(), "{entry}");
            listing.push(entry);
        }
        Ok(listing)
    }

    fn sample_keys(&self, store: &RecordStore, topic: &Topic) -> Result<Vec<String>> {
        let Some(record) = store.first_message(topic.id)? else {
            return Ok(Vec::new());
        };
        let schema = self.resolver.resolve_message(&topic.type_name)?;
        let message = self.deserializer.deserialize(&record.data, &schema)?;
        let row = flatten(&message_to_dict(&message));
        Ok(row.keys().map(str::to_string).collect())
    }

    /// Extract every topic with at least one decodable record, in id order.
    pub fn extract_all(&self) -> Result<Vec<TopicTable>> {
        let store = self.connected_store()?;
        let started = Instant::now();
        let topics = store.topics()?;
        let mut tables = Vec::with_capacity(topics.len());

        for topic in &topics {
            let schema = match self.resolver.resolve_message(&topic.type_name) {
                Ok(schema) => schema,
                Err(err) => {
                    warn!(
                        topic = %topic.name,
                        type_name = %topic.type_name,
                        error = %err,
                        "Skipping topic with unknown type"
                    );
                    continue;
                }
            };

            let rows = self.extract_topic(store, topic, &schema)?;
            if rows.is_empty() {
                debug!(topic = %topic.name, "No rows extracted; topic omitted");
                continue;
            }
            let table = TopicTable::from_rows(&topic.name, &rows)?;
            match self.config.progress {
                ProgressMode::Off => {
                    debug!(topic = %topic.name, records = rows.len(), "Extracted topic")
                }
                ProgressMode::Topics | ProgressMode::Records => {
                    info!(topic = %topic.name, records = rows.len(), "Extracted topic")
                }
            }
            tables.push(table);
        }

        info!(
            topics = tables.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extraction finished"
        );
        Ok(tables)
    }

    fn extract_topic(
        &self,
        store: &RecordStore,
        topic: &Topic,
        schema: &Arc<MessageSchema>,
    ) -> Result<Vec<Dict>> {
        let interval = self.config.progress_interval.max(1);
        let mut first_timestamp = None;
        let mut rows = Vec::new();
        let mut skipped = 0usize;

        let seen = store.for_each_message(topic.id, |record| {
            let first = *first_timestamp.get_or_insert(record.timestamp);
            match self.deserializer.deserialize(&record.data, schema) {
                Ok(message) => {
                    let mut row = Dict::with_capacity(2);
                    row.insert(ROW_TIME_COLUMN, row_time(record.timestamp));
                    row.insert(MSEC_COLUMN, msec(record.timestamp, first));
                    row.extend(flatten(&message_to_dict(&message)));
                    rows.push(row);
                }
                Err(err) => {
                    skipped += 1;
                    warn!(
                        topic = %topic.name,
                        record = record.id,
                        error = %err,
                        "Skipping undecodable record"
                    );
                }
            }
            if self.config.progress == ProgressMode::Records {
                let done = rows.len() + skipped;
                if done as u64 % interval == 0 {
                    info!(topic = %topic.name, records = done, "Extraction progress");
                }
            }
        })?;

        debug!(topic = %topic.name, records = seen, skipped, "Read topic records");
        Ok(rows)
    }

    /// Table for `topic`, from cache when allowed, otherwise by extraction.
    pub fn topic_table(&mut self, topic: &str) -> Result<TopicTable> {
        let store_path = self.location.clone().ok_or(BagError::NotConnected)?;
        let format = self.config.cache_format;
        let cached = self.cache_path(topic, format)?;

        if self.config.use_cache && cached.is_file() {
            self.close()?;
            warn_if_stale(&store_path, &cached);
            info!(topic, path = %cached.display(), "Loading cached table");
            return Ok(read_table(topic, &cached, format)?);
        }

        if self.store.is_none() {
            self.store = Some(RecordStore::open(&store_path)?);
        }
        let extracted = self.extract_all();
        let closed = self.close();
        let tables = extracted?;
        closed?;

        match self.config.cache_scope {
            CacheScope::AllTopics => {
                self.save_cache(&tables, &[format])?;
            }
            CacheScope::RequestedOnly => {
                let requested: Vec<TopicTable> = tables
                    .iter()
                    .filter(|table| table.topic() == topic)
                    .cloned()
                    .collect();
                self.save_cache(&requested, &[format])?;
            }
        }

        tables
            .into_iter()
            .find(|table| table.topic() == topic)
            .ok_or_else(|| BagError::TopicNotFound(topic.to_string()))
    }

    /// Write each table in each format next to the store.
    pub fn save_cache(&self, tables: &[TopicTable], formats: &[CacheFormat]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(tables.len() * formats.len());
        for table in tables {
            for &format in formats {
                let path = self.cache_path(table.topic(), format)?;
                write_table(table, &path, format, &self.writer_config)?;
                info!(
                    topic = table.topic(),
                    format = %format,
                    rows = table.num_rows(),
                    path = %path.display(),
                    "Wrote cache"
                );
                written.push(path);
            }
        }
        Ok(written)
    }

    /// Read a cache file back without consulting the store.
    pub fn load_cache(&self, topic: &str, format: CacheFormat) -> Result<TopicTable> {
        let path = self.cache_path(topic, format)?;
        if !path.is_file() {
            return Err(BagError::NotFound(path));
        }
        Ok(read_table(topic, &path, format)?)
    }
}

impl Drop for BagReader {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "Failed to close record store");
        }
    }
}

fn warn_if_stale(store_path: &Path, cache_path: &Path) {
    let modified = |path: &Path| fs::metadata(path).and_then(|meta| meta.modified()).ok();
    if let (Some(store), Some(cache)) = (modified(store_path), modified(cache_path)) {
        if store > cache {
            warn!(
                store = %store_path.display(),
                cache = %cache_path.display(),
                "Record store is newer than its cache; serving the cache"
            );
        }
    }
}
