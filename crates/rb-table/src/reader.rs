//! Cache file reader.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::csv::reader::Format as CsvFormat;
use arrow::csv::ReaderBuilder as CsvReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::ipc::reader::FileReader as IpcFileReader;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rb_msg::{Dict, Value};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::format::CacheFormat;
use crate::sidecar::{read_sidecar, sidecar_path};
use crate::table::TopicTable;
use crate::writer::CSV_NULL;

/// Read a cache file written by [`crate::write_table`].
///
/// Parquet and Feather keep the column types themselves. CSV and JSON are
/// read with the types from their schema sidecar; without one (or when it
/// no longer names the file's columns) the types are inferred from the
/// values instead.
pub fn read_table(topic: &str, path: &Path, format: CacheFormat) -> Result<TopicTable> {
    let table = match format {
        CacheFormat::Parquet => {
            let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
            let schema = builder.schema().clone();
            let batches = builder.build()?.collect::<std::result::Result<Vec<_>, _>>()?;
            TopicTable::from_batch(topic, concat(schema, &batches)?)
        }
        CacheFormat::Feather => {
            let reader = IpcFileReader::try_new(BufReader::new(File::open(path)?), None)?;
            let schema = reader.schema();
            let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
            TopicTable::from_batch(topic, concat(schema, &batches)?)
        }
        CacheFormat::Csv => {
            let header = csv_header(path)?;
            match read_sidecar(path)? {
                Some(schema) if names_match(&schema, header.iter().map(String::as_str)) => {
                    TopicTable::from_batch(topic, read_csv(path, schema)?)
                }
                sidecar => {
                    if sidecar.is_some() {
                        warn_sidecar_mismatch(path);
                    }
                    read_csv_inferred(topic, path, &header)?
                }
            }
        }
        CacheFormat::Json => {
            let text = fs::read_to_string(path)?;
            let rows: Vec<Dict> = serde_json::from_str(&text)?;
            match read_sidecar(path)? {
                Some(schema) if rows.iter().all(|row| names_match(&schema, row.keys())) => {
                    TopicTable::from_rows_with_schema(topic, &rows, schema)?
                }
                sidecar => {
                    if sidecar.is_some() {
                        warn_sidecar_mismatch(path);
                    }
                    TopicTable::from_rows(topic, &rows)?
                }
            }
        }
    };
    debug!(
        topic,
        path = %path.display(),
        format = %format,
        rows = table.num_rows(),
        "Loaded cache file"
    );
    Ok(table)
}

fn concat(schema: SchemaRef, batches: &[RecordBatch]) -> Result<RecordBatch> {
    Ok(concat_batches(&schema, batches)?)
}

fn names_match<'a>(schema: &Schema, names: impl Iterator<Item = &'a str>) -> bool {
    let mut fields = schema.fields().iter();
    for name in names {
        match fields.next() {
            Some(field) if field.name() == name => {}
            _ => return false,
        }
    }
    fields.next().is_none()
}

fn warn_sidecar_mismatch(path: &Path) {
    warn!(
        path = %path.display(),
        sidecar = %sidecar_path(path).display(),
        "Schema sidecar does not match cache columns, inferring types"
    );
}

fn csv_null() -> Result<Regex> {
    Regex::new(&format!("^{}$", regex::escape(CSV_NULL)))
        .map_err(|err| ArrowError::InvalidArgumentError(err.to_string()).into())
}

fn csv_header(path: &Path) -> Result<Vec<String>> {
    let (header, _) = CsvFormat::default()
        .with_header(true)
        .infer_schema(File::open(path)?, Some(0))?;
    Ok(header.fields().iter().map(|f| f.name().clone()).collect())
}

fn read_csv(path: &Path, schema: SchemaRef) -> Result<RecordBatch> {
    let reader = CsvReaderBuilder::new(Arc::clone(&schema))
        .with_header(true)
        .with_null_regex(csv_null()?)
        .build(BufReader::new(File::open(path)?))?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    concat(schema, &batches)
}

fn read_csv_inferred(topic: &str, path: &Path, header: &[String]) -> Result<TopicTable> {
    // Read every column as text; cell types are inferred from the values.
    let text_schema = Arc::new(Schema::new(
        header
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    let text = TopicTable::from_batch(topic, read_csv(path, text_schema)?);
    let rows: Vec<Dict> = text
        .rows()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(key, value)| (key, parse_csv_cell(value)))
                .collect()
        })
        .collect();
    TopicTable::from_rows(topic, &rows)
}

fn parse_csv_cell(value: Value) -> Value {
    let Value::Str(text) = value else {
        return value;
    };
    if let Ok(flag) = text.parse::<bool>() {
        Value::Bool(flag)
    } else if let Ok(n) = text.parse::<i64>() {
        Value::Int(n)
    } else if let Ok(n) = text.parse::<u64>() {
        Value::U64(n)
    } else if let Ok(x) = text.parse::<f64>() {
        Value::Float(x)
    } else {
        Value::Str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{write_table, WriterConfig};
    use tempfile::TempDir;

    fn rows() -> Vec<Dict> {
        let labels = ["7", "", "true"];
        let big = [Value::U64(7), Value::U64(u64::MAX), Value::Null];
        (0..3)
            .map(|i| {
                let mut row = Dict::new();
                row.insert("row_time", format!("2024/05/01 10:00:0{i}.25"));
                row.insert("msec", Value::Float(f64::from(i) * 1000.0 + 0.25));
                row.insert("count", Value::Int(i64::from(i)));
                row.insert("ok", Value::Bool(i % 2 == 0));
                row.insert("label", labels[i as usize]);
                row.insert("big", big[i as usize].clone());
                row.insert("note", if i == 1 { Value::from("x") } else { Value::Null });
                row
            })
            .collect()
    }

    #[test]
    fn test_every_format_reads_back_identical() {
        let dir = TempDir::new().unwrap();
        let table = TopicTable::from_rows("/t", &rows()).unwrap();
        assert_eq!(table.schema().field_with_name("big").unwrap().data_type(), &DataType::UInt64);
        for format in CacheFormat::ALL {
            let path = dir.path().join(format!("t.{format}"));
            write_table(&table, &path, format, &WriterConfig::default()).unwrap();
            let loaded = read_table("/t", &path, format).unwrap();
            assert_eq!(loaded, table, "{format}");
            assert_eq!(loaded.value(0, "label"), Some(Value::from("7")), "{format}");
            assert_eq!(loaded.value(1, "label"), Some(Value::from("")), "{format}");
            assert_eq!(loaded.value(2, "label"), Some(Value::from("true")), "{format}");
            assert_eq!(loaded.value(0, "big"), Some(Value::U64(7)), "{format}");
            assert_eq!(loaded.value(2, "big"), Some(Value::Null), "{format}");
        }
    }

    #[test]
    fn test_csv_without_sidecar_infers_types() {
        let dir = TempDir::new().unwrap();
        let table = TopicTable::from_rows("/t", &rows()).unwrap();
        let path = dir.path().join("t.csv");
        write_table(&table, &path, CacheFormat::Csv, &WriterConfig::default()).unwrap();
        fs::remove_file(sidecar_path(&path)).unwrap();

        let loaded = read_table("/t", &path, CacheFormat::Csv).unwrap();
        assert_eq!(loaded.column_names(), table.column_names());
        assert_eq!(loaded.value(1, "msec"), Some(Value::Float(1000.25)));
        assert_eq!(loaded.value(0, "count"), Some(Value::Int(0)));
        assert_eq!(loaded.value(0, "note"), Some(Value::Null));
        // Mixed guesses fall back to text.
        assert_eq!(loaded.value(0, "label"), Some(Value::from("7")));
        assert_eq!(loaded.value(1, "label"), Some(Value::from("")));
        assert_eq!(loaded.value(2, "label"), Some(Value::from("true")));
        assert_eq!(
            loaded.schema().field_with_name("big").unwrap().data_type(),
            &DataType::Float64
        );
    }

    #[test]
    fn test_stale_sidecar_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        let table = TopicTable::from_rows("/t", &rows()).unwrap();
        write_table(&table, &path, CacheFormat::Json, &WriterConfig::default()).unwrap();

        let other: Vec<Dict> = vec![[("only", Value::Int(1))].into_iter().collect()];
        crate::sidecar::write_sidecar(&TopicTable::from_rows("/t", &other).unwrap().schema(), &path)
            .unwrap();
        let loaded = read_table("/t", &path, CacheFormat::Json).unwrap();
        assert_eq!(loaded.column_names(), table.column_names());
        assert_eq!(loaded.num_rows(), 3);

        let csv = dir.path().join("t.csv");
        write_table(&table, &csv, CacheFormat::Csv, &WriterConfig::default()).unwrap();
        fs::copy(sidecar_path(&path), sidecar_path(&csv)).unwrap();
        let loaded = read_table("/t", &csv, CacheFormat::Csv).unwrap();
        assert_eq!(loaded.column_names(), table.column_names());
    }

    #[test]
    fn test_csv_cell_types() {
        assert_eq!(parse_csv_cell(Value::from("true")), Value::Bool(true));
        assert_eq!(parse_csv_cell(Value::from("-3")), Value::Int(-3));
        assert_eq!(
            parse_csv_cell(Value::from("18446744073709551615")),
            Value::U64(u64::MAX)
        );
        assert_eq!(parse_csv_cell(Value::from("0.5")), Value::Float(0.5));
        assert_eq!(
            parse_csv_cell(Value::from("2024/05/01 10:00:00.25")),
            Value::from("2024/05/01 10:00:00.25")
        );
        assert_eq!(parse_csv_cell(Value::Null), Value::Null);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_table("/t", &dir.path().join("nope.parquet"), CacheFormat::Parquet)
            .unwrap_err();
        assert_eq!(err.category(), rb_msg::ErrorCategory::Io);
    }

    #[test]
    fn test_corrupt_json_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        fs::write(&path, "[{\"a\": 1},").unwrap();
        let err = read_table("/t", &path, CacheFormat::Json).unwrap_err();
        assert_eq!(err.category(), rb_msg::ErrorCategory::Decode);
    }
}
