//! Row timestamps and cache file naming.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rb_table::CacheFormat;

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MSEC: f64 = 1_000_000.0;

/// Local wall-clock time of a record: `%Y/%m/%d %H:%M:%S.` followed by the
/// nanosecond remainder as a plain integer (not zero padded).
pub fn row_time(timestamp_ns: i64) -> String {
    let secs = timestamp_ns.div_euclid(NANOS_PER_SEC);
    let nanos = timestamp_ns.rem_euclid(NANOS_PER_SEC);
    match DateTime::from_timestamp(secs, 0) {
        Some(utc) => format!(
            "{}.{}",
            utc.with_timezone(&Local).format("%Y/%m/%d %H:%M:%S"),
            nanos
        ),
        None => timestamp_ns.to_string(),
    }
}

/// Milliseconds since the topic's first record.
pub fn msec(timestamp_ns: i64, first_ns: i64) -> f64 {
    timestamp_ns.saturating_sub(first_ns) as f64 / NANOS_PER_MSEC
}

/// `/sg/pressure` -> `sg_pressure`.
pub fn sanitize_topic_name(topic: &str) -> String {
    topic.trim_matches('/').replace('/', "_")
}

/// Cache file for `topic` in `format` inside `dir`.
pub fn cache_file(dir: &Path, topic: &str, format: CacheFormat) -> PathBuf {
    dir.join(format!(
        "{}.{}",
        sanitize_topic_name(topic),
        format.extension()
    ))
}
