//! Arrow schema inference for flat topic rows.
//!
//! Columns appear in first-seen key order across all rows. A column's type
//! is the join of the types of its non-null values:
//!
//! - `bool` only -> `Boolean`
//! - signed or narrow unsigned integers -> `Int64`
//! - `uint64` -> `UInt64`
//! - floats, or a mix of numeric kinds -> `Float64`
//! - strings, all-null columns, and anything mixed -> `Utf8`
//!
//! Every column is nullable; keys missing from a row become nulls.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema};
use rb_msg::{Dict, Value};
use serde::{Deserialize, Serialize};

/// Inferred column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Int64,
    UInt64,
    Float64,
    Utf8,
}

impl ColumnType {
    /// Column type of a single non-null value.
    pub fn of(value: &Value) -> Option<Self> {
        let column = match value {
            Value::Null => return None,
            Value::Bool(_) => ColumnType::Boolean,
            Value::Int(_)
            | Value::I8(_)
            | Value::I16(_)
            | Value::I32(_)
            | Value::I64(_)
            | Value::U8(_)
            | Value::U16(_)
            | Value::U32(_) => ColumnType::Int64,
            Value::U64(_) => ColumnType::UInt64,
            Value::Float(_) | Value::F32(_) | Value::F64(_) => ColumnType::Float64,
            Value::Str(_) | Value::List(_) | Value::Dict(_) => ColumnType::Utf8,
        };
        Some(column)
    }

    /// Smallest type holding values of both.
    pub fn join(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Int64 | UInt64 | Float64, Int64 | UInt64 | Float64) => Float64,
            _ => Utf8,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::UInt64 => DataType::UInt64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
        }
    }

    /// Inverse of [`ColumnType::data_type`]; `None` for any other Arrow type.
    pub fn from_data_type(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Boolean => Some(ColumnType::Boolean),
            DataType::Int64 => Some(ColumnType::Int64),
            DataType::UInt64 => Some(ColumnType::UInt64),
            DataType::Float64 => Some(ColumnType::Float64),
            DataType::Utf8 => Some(ColumnType::Utf8),
            _ => None,
        }
    }
}

/// Ordered column names and types inferred from a set of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnLayout {
    columns: Vec<(String, Option<ColumnType>)>,
    index: HashMap<String, usize>,
}

impl ColumnLayout {
    pub fn infer<'a>(rows: impl IntoIterator<Item = &'a Dict>) -> Self {
        let mut layout = ColumnLayout::default();
        for row in rows {
            for (key, value) in row.iter() {
                layout.observe(key, value);
            }
        }
        layout
    }

    fn observe(&mut self, key: &str, value: &Value) {
        let position = match self.index.get(key) {
            Some(&position) => position,
            None => {
                self.columns.push((key.to_string(), None));
                self.index.insert(key.to_string(), self.columns.len() - 1);
                self.columns.len() - 1
            }
        };
        if let Some(observed) = ColumnType::of(value) {
            let slot = &mut self.columns[position].1;
            *slot = Some(match *slot {
                Some(current) => current.join(observed),
                None => observed,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names with their resolved types; all-null columns are `Utf8`.
    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns
            .iter()
            .map(|(name, ty)| (name.as_str(), ty.unwrap_or(ColumnType::Utf8)))
    }

    pub fn schema(&self) -> Arc<Schema> {
        let fields: Vec<Field> = self
            .columns()
            .map(|(name, ty)| Field::new(name, ty.data_type(), true))
            .collect();
        Arc::new(Schema::new(fields))
    }
}
