//! Cache file writer.
//!
//! Every format is written to `<file>.tmp` first and renamed into place
//! once complete, so a reader never sees a partial cache file. CSV and JSON
//! caches get their schema sidecar before the data file is renamed.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use arrow::csv::WriterBuilder as CsvWriterBuilder;
use arrow::ipc::writer::FileWriter as IpcFileWriter;
use arrow::json::writer::{JsonArray, WriterBuilder as JsonWriterBuilder};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use tracing::{debug, warn};

use crate::error::Result;
use crate::format::CacheFormat;
use crate::sidecar::write_sidecar;
use crate::table::TopicTable;

/// Cell text for nulls in CSV caches; an empty cell is an empty string.
pub const CSV_NULL: &str = "\\N";

/// Writer settings.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Parquet compression codec.
    pub compression: Compression,

    /// Parquet rows per row group.
    pub row_group_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            compression: ZstdLevel::try_new(3)
                .map(Compression::ZSTD)
                .unwrap_or(Compression::SNAPPY),
            row_group_size: 64 * 1024,
        }
    }
}

impl WriterConfig {
    /// Use snappy compression instead of zstd.
    pub fn with_snappy(mut self) -> Self {
        self.compression = Compression::SNAPPY;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set custom row group size.
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    fn properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .set_dictionary_enabled(true)
            .build()
    }
}

/// Write `table` to `path` in `format`, atomically.
pub fn write_table(
    table: &TopicTable,
    path: &Path,
    format: CacheFormat,
    config: &WriterConfig,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp_path = temp_path_for(path);

    let written = File::create(&temp_path)
        .map_err(Into::into)
        .and_then(|file| write_format(table, file, format, config))
        .and_then(|()| {
            if format.carries_schema() {
                Ok(())
            } else {
                write_sidecar(&table.schema(), path)
            }
        });
    if let Err(err) = written {
        if let Err(cleanup) = fs::remove_file(&temp_path) {
            warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove partial cache file");
        }
        return Err(err);
    }

    atomic_rename(&temp_path, path)?;
    debug!(
        topic = table.topic(),
        path = %path.display(),
        format = %format,
        rows = table.num_rows(),
        "Wrote cache file"
    );
    Ok(())
}

fn write_format(
    table: &TopicTable,
    file: File,
    format: CacheFormat,
    config: &WriterConfig,
) -> Result<()> {
    let batch = table.batch();
    match format {
        CacheFormat::Parquet => {
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(config.properties()))?;
            writer.write(batch)?;
            writer.close()?;
        }
        CacheFormat::Feather => {
            let mut writer = IpcFileWriter::try_new(BufWriter::new(file), &batch.schema())?;
            writer.write(batch)?;
            writer.finish()?;
            writer.into_inner()?.flush()?;
        }
        CacheFormat::Csv => {
            let mut out = BufWriter::new(file);
            {
                let mut writer = CsvWriterBuilder::new()
                    .with_header(true)
                    .with_null(CSV_NULL.to_string())
                    .build(&mut out);
                writer.write(batch)?;
            }
            out.flush()?;
        }
        CacheFormat::Json => {
            let mut out = BufWriter::new(file);
            {
                let mut writer = JsonWriterBuilder::new()
                    .with_explicit_nulls(true)
                    .build::<_, JsonArray>(&mut out);
                writer.write(batch)?;
                writer.finish()?;
            }
            out.flush()?;
        }
    }
    Ok(())
}

/// `<file>.tmp` next to `path`.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Helper to rename temp file to final path atomically.
pub fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<()> {
    fs::rename(temp_path, final_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::sidecar_path;
    use rb_msg::{Dict, Value};
    use tempfile::TempDir;

    fn table() -> TopicTable {
        let rows: Vec<Dict> = vec![
            [("msec", Value::Float(0.0)), ("data", Value::from("a"))]
                .into_iter()
                .collect(),
            [("msec", Value::Float(1.5)), ("data", Value::Null)]
                .into_iter()
                .collect(),
        ];
        TopicTable::from_rows("/t", &rows).unwrap()
    }

    #[test]
    fn test_writer_config_defaults() {
        let config = WriterConfig::default();
        assert!(matches!(config.compression, Compression::ZSTD(_)));
        assert!(matches!(
            config.with_snappy().compression,
            Compression::SNAPPY
        ));
    }

    #[test]
    fn test_temp_path_appends_suffix() {
        assert_eq!(
            temp_path_for(Path::new("/data/sg_pressure.parquet")),
            PathBuf::from("/data/sg_pressure.parquet.tmp")
        );
    }

    #[test]
    fn test_every_format_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        for format in CacheFormat::ALL {
            let path = dir.path().join(format!("t.{}", format.extension()));
            write_table(&table(), &path, format, &WriterConfig::default()).unwrap();
            assert!(path.exists(), "{format}");
            assert!(!temp_path_for(&path).exists(), "{format}");
            let sidecar = sidecar_path(&path);
            assert_eq!(sidecar.exists(), !format.carries_schema(), "{format}");
            assert!(!temp_path_for(&sidecar).exists(), "{format}");
        }
    }

    #[test]
    fn test_json_has_explicit_nulls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        write_table(&table(), &path, CacheFormat::Json, &WriterConfig::default()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let rows = parsed.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["data"], serde_json::Value::Null);
        assert!(rows[1].as_object().unwrap().contains_key("data"));
    }

    #[test]
    fn test_csv_marks_nulls_apart_from_empty_strings() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<Dict> = vec![
            [("n", Value::Int(1)), ("data", Value::from(""))]
                .into_iter()
                .collect(),
            [("n", Value::Int(2)), ("data", Value::Null)]
                .into_iter()
                .collect(),
        ];
        let table = TopicTable::from_rows("/t", &rows).unwrap();
        let path = dir.path().join("t.csv");
        write_table(&table, &path, CacheFormat::Csv, &WriterConfig::default()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["n,data".to_string(), "1,".to_string(), format!("2,{CSV_NULL}")]);
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        write_table(&table(), &path, CacheFormat::Csv, &WriterConfig::default()).unwrap();
        let before = fs::read(&path).unwrap();

        // A directory squatting on the temp path makes the next write fail.
        fs::create_dir(temp_path_for(&path)).unwrap();
        assert!(write_table(&table(), &path, CacheFormat::Csv, &WriterConfig::default()).is_err());
        assert_eq!(fs::read(&path).unwrap(), before);
    }
}
