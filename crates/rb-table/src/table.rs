//! Topic tables: flat rows collected into one Arrow record batch.

use std::fmt;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, RecordBatch, RecordBatchOptions, StringArray, StringBuilder, UInt64Array,
    UInt64Builder,
};
use arrow::datatypes::{DataType, Schema, SchemaRef};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use rb_msg::{Dict, Value};

use crate::error::{Result, TableError};
use crate::schema::{ColumnLayout, ColumnType};

/// One topic's rows as a record batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicTable {
    topic: String,
    batch: RecordBatch,
}

impl TopicTable {
    /// Build a table from flat rows, inferring the column layout.
    pub fn from_rows(topic: &str, rows: &[Dict]) -> Result<Self> {
        Self::from_rows_with_schema(topic, rows, ColumnLayout::infer(rows).schema())
    }

    /// Build a table whose columns are exactly `schema`'s. Row keys outside
    /// the schema are ignored; values that do not fit a column become null.
    pub fn from_rows_with_schema(topic: &str, rows: &[Dict], schema: SchemaRef) -> Result<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                let column_type = ColumnType::from_data_type(field.data_type()).ok_or_else(|| {
                    TableError::UnsupportedColumn {
                        column: field.name().clone(),
                        data_type: field.data_type().to_string(),
                    }
                })?;
                Ok(build_column(field.name(), column_type, rows))
            })
            .collect::<Result<Vec<_>>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
        let batch = RecordBatch::try_new_with_options(schema, columns, &options)?;
        Ok(TopicTable {
            topic: topic.to_string(),
            batch,
        })
    }

    /// Wrap an existing batch, e.g. one read back from a cache file.
    pub fn from_batch(topic: &str, batch: RecordBatch) -> Self {
        TopicTable {
            topic: topic.to_string(),
            batch,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Cell value at `row` of column `name`.
    pub fn value(&self, row: usize, name: &str) -> Option<Value> {
        let column = self.column(name)?;
        (row < column.len()).then(|| cell_value(column, row))
    }

    /// Rows back as dictionaries; nulls are kept as [`Value::Null`].
    pub fn rows(&self) -> Vec<Dict> {
        let schema = self.batch.schema();
        (0..self.num_rows())
            .map(|row| {
                schema
                    .fields()
                    .iter()
                    .zip(self.batch.columns())
                    .map(|(field, column)| (field.name().clone(), cell_value(column, row)))
                    .collect()
            })
            .collect()
    }

    /// Same rows with `schema`, casting columns where a cache format
    /// changed their type (e.g. CSV integers read back as floats).
    pub fn with_schema(&self, schema: Arc<Schema>) -> Result<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|field| match self.batch.column_by_name(field.name()) {
                Some(column) => Ok(arrow::compute::cast(column, field.data_type())?),
                None => Ok(arrow::array::new_null_array(field.data_type(), self.num_rows())),
            })
            .collect::<Result<Vec<_>>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows()));
        let batch = RecordBatch::try_new_with_options(schema, columns, &options)?;
        Ok(TopicTable::from_batch(&self.topic, batch))
    }
}

impl fmt::Display for TopicTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} rows)", self.topic, self.num_rows())?;
        let pretty = arrow::util::pretty::pretty_format_batches(std::slice::from_ref(&self.batch))
            .map_err(|_| fmt::Error)?;
        write!(f, "{pretty}")
    }
}

fn build_column(name: &str, column_type: ColumnType, rows: &[Dict]) -> ArrayRef {
    let cells = rows.iter().map(|row| row.get(name).filter(|v| !v.is_null()));
    match column_type {
        ColumnType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(cell.and_then(Value::as_bool));
            }
            Arc::new(builder.finish())
        }
        ColumnType::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(
                    cell.and_then(Value::as_i128)
                        .and_then(|n| i64::try_from(n).ok()),
                );
            }
            Arc::new(builder.finish())
        }
        ColumnType::UInt64 => {
            let mut builder = UInt64Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(
                    cell.and_then(Value::as_i128)
                        .and_then(|n| u64::try_from(n).ok()),
                );
            }
            Arc::new(builder.finish())
        }
        ColumnType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(cell.and_then(Value::as_f64));
            }
            Arc::new(builder.finish())
        }
        ColumnType::Utf8 => {
            let mut builder = StringBuilder::with_capacity(rows.len(), rows.len() * 8);
            for cell in cells {
                match cell {
                    Some(Value::Str(s)) => builder.append_value(s),
                    Some(other) => builder.append_value(other.to_string()),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

fn cell_value(column: &ArrayRef, row: usize) -> Value {
    if column.is_null(row) {
        return Value::Null;
    }
    let any = column.as_any();
    match column.data_type() {
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| Value::Bool(a.value(row))),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| Value::Int(a.value(row))),
        DataType::UInt64 => any
            .downcast_ref::<UInt64Array>()
            .map(|a| Value::U64(a.value(row))),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| Value::Float(a.value(row))),
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|a| Value::Str(a.value(row).to_string())),
        _ => None,
    }
    .unwrap_or_else(|| display_value(column, row))
}

fn display_value(column: &ArrayRef, row: usize) -> Value {
    match ArrayFormatter::try_new(column.as_ref(), &FormatOptions::default()) {
        Ok(formatter) => Value::Str(formatter.value(row).to_string()),
        Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(entries: &[(&str, Value)]) -> Dict {
        entries.iter().cloned().collect()
    }

    fn sample_rows() -> Vec<Dict> {
        vec![
            row(&[
                ("row_time", Value::from("2024/01/01 00:00:00.5")),
                ("msec", Value::Float(0.0)),
                ("data", Value::Int(1)),
            ]),
            row(&[
                ("row_time", Value::from("2024/01/01 00:00:01.7")),
                ("msec", Value::Float(1000.0)),
                ("extra", Value::Bool(true)),
            ]),
        ]
    }

    #[test]
    fn test_from_rows_layout_and_nulls() {
        let table = TopicTable::from_rows("/chatter", &sample_rows()).unwrap();
        assert_eq!(table.topic(), "/chatter");
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column_names(), vec!["row_time", "msec", "data", "extra"]);
        assert_eq!(table.value(0, "data"), Some(Value::Int(1)));
        assert_eq!(table.value(1, "data"), Some(Value::Null));
        assert_eq!(table.value(0, "extra"), Some(Value::Null));
        assert_eq!(table.value(1, "msec"), Some(Value::Float(1000.0)));
        assert_eq!(table.value(2, "msec"), None);
        assert_eq!(table.value(0, "missing"), None);
    }

    #[test]
    fn test_rows_round_trip_with_explicit_nulls() {
        let table = TopicTable::from_rows("/chatter", &sample_rows()).unwrap();
        let rows = table.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("extra"), Some(&Value::Null));
        assert_eq!(rows[1].get("data"), Some(&Value::Null));
        assert_eq!(TopicTable::from_rows("/chatter", &rows).unwrap(), table);
    }

    #[test]
    fn test_schema_decides_column_types() {
        let rows = vec![
            row(&[("label", Value::from("7")), ("big", Value::Int(5))]),
            row(&[("label", Value::from("true")), ("big", Value::U64(u64::MAX))]),
        ];
        let schema = Arc::new(Schema::new(vec![
            arrow::datatypes::Field::new("big", DataType::UInt64, true),
            arrow::datatypes::Field::new("label", DataType::Utf8, true),
            arrow::datatypes::Field::new("absent", DataType::Boolean, true),
        ]));
        let table = TopicTable::from_rows_with_schema("/t", &rows, Arc::clone(&schema)).unwrap();
        assert_eq!(table.schema(), schema);
        assert_eq!(table.value(0, "big"), Some(Value::U64(5)));
        assert_eq!(table.value(1, "big"), Some(Value::U64(u64::MAX)));
        assert_eq!(table.value(0, "label"), Some(Value::from("7")));
        assert_eq!(table.value(1, "absent"), Some(Value::Null));

        let odd = Arc::new(Schema::new(vec![arrow::datatypes::Field::new(
            "big",
            DataType::Int32,
            true,
        )]));
        assert!(matches!(
            TopicTable::from_rows_with_schema("/t", &rows, odd),
            Err(TableError::UnsupportedColumn { .. })
        ));
    }

    #[test]
    fn test_empty_rows_give_empty_table() {
        let table = TopicTable::from_rows("/empty", &[]).unwrap();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.num_columns(), 0);
    }

    #[test]
    fn test_with_schema_casts_columns() {
        let table = TopicTable::from_rows("/t", &[row(&[("n", Value::Int(3))])]).unwrap();
        let target = Arc::new(Schema::new(vec![
            arrow::datatypes::Field::new("n", DataType::Float64, true),
            arrow::datatypes::Field::new("gone", DataType::Utf8, true),
        ]));
        let cast = table.with_schema(target).unwrap();
        assert_eq!(cast.value(0, "n"), Some(Value::Float(3.0)));
        assert_eq!(cast.value(0, "gone"), Some(Value::Null));
    }

    #[test]
    fn test_display_includes_topic_and_values() {
        let table = TopicTable::from_rows("/chatter", &sample_rows()).unwrap();
        let text = table.to_string();
        assert!(text.starts_with("/chatter (2 rows)"));
        assert!(text.contains("row_time"));
        assert!(text.contains("2024/01/01 00:00:01.7"));
    }
}
