//! Read-only access to a rosbag2 SQLite record store.
//!
//! Only the two tables the reader needs are touched:
//! `topics(id, name, type, ...)` and `messages(id, topic_id, timestamp, data)`.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::error::{BagError, Result};

/// File extension of rosbag2 SQLite stores.
pub const STORE_EXTENSION: &str = "db3";

/// One row of the `topics` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: i64,
    pub name: String,
    pub type_name: String,
}

/// One row of the `messages` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: i64,
    pub topic_id: i64,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub data: Vec<u8>,
}

/// Find the store file for `path`: the file itself, or the lexicographically
/// first `*.db3` inside a directory.
pub fn locate_store(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if !path.is_dir() {
        return Err(BagError::NotFound(path.to_path_buf()));
    }
    let mut candidates: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == STORE_EXTENSION))
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| BagError::NotFound(path.to_path_buf()))
}

/// Open read-only connection to one store file.
#[derive(Debug)]
pub struct RecordStore {
    conn: Connection,
    path: PathBuf,
}

impl RecordStore {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BagError::NotFound(path.to_path_buf()));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        debug!(path = %path.display(), "Opened record store");
        Ok(RecordStore {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All topics in id order.
    pub fn topics(&self) -> Result<Vec<Topic>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, type FROM topics ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Topic {
                id: row.get(0)?,
                name: row.get(1)?,
                type_name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn message_count(&self, topic_id: i64) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE topic_id = ?1",
            params![topic_id],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Earliest-arrived record of a topic.
    pub fn first_message(&self, topic_id: i64) -> Result<Option<MessageRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, topic_id, timestamp, data FROM messages \
                 WHERE topic_id = ?1 ORDER BY id LIMIT 1",
                params![topic_id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Stream a topic's records in arrival order; returns how many were seen.
    pub fn for_each_message<F>(&self, topic_id: i64, mut f: F) -> Result<usize>
    where
        F: FnMut(MessageRecord),
    {
        let mut stmt = self.conn.prepare(
            "SELECT id, topic_id, timestamp, data FROM messages \
             WHERE topic_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![topic_id], record_from_row)?;
        let mut seen = 0;
        for record in rows {
            f(record?);
            seen += 1;
        }
        Ok(seen)
    }

    /// A topic's records in arrival order.
    pub fn messages(&self, topic_id: i64) -> Result<Vec<MessageRecord>> {
        let mut records = Vec::new();
        self.for_each_message(topic_id, |record| records.push(record))?;
        Ok(records)
    }

    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn.close().map_err(|(_, err)| BagError::Sqlite(err))?;
        debug!(path = %path.display(), "Closed record store");
        Ok(())
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        timestamp: row.get(2)?,
        data: row.get(3)?,
    })
}
