//! Column schema sidecars.
//!
//! CSV and JSON caches lose column types: a `uint64` column of small
//! values reads back as integers, a string of digits as a number. Next to
//! such a cache the writer keeps `<file>.schema.json`, an ordered list of
//! column names and [`ColumnType`]s, and the reader builds the table from
//! it instead of guessing.
//!
//! ```json
//! {"columns": [{"name": "label", "type": "utf8"}, {"name": "big", "type": "uint64"}]}
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::{Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TableError};
use crate::schema::ColumnType;
use crate::writer::{atomic_rename, temp_path_for};

#[derive(Debug, Serialize, Deserialize)]
struct SidecarColumn {
    name: String,
    #[serde(rename = "type")]
    column_type: ColumnType,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    columns: Vec<SidecarColumn>,
}

/// `<file>.schema.json` next to the cache file at `path`.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".schema.json");
    PathBuf::from(name)
}

/// Write the sidecar for the cache file at `path`, atomically.
pub fn write_sidecar(schema: &Schema, path: &Path) -> Result<()> {
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
            Ok(SidecarColumn {
                name: field.name().clone(),
                column_type,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let target = sidecar_path(path);
    let temp = temp_path_for(&target);
    fs::write(&temp, serde_json::to_vec(&Sidecar { columns })?)?;
    atomic_rename(&temp, &target)
}

/// Schema recorded next to the cache file at `path`; `None` when there is
/// no sidecar.
pub fn read_sidecar(path: &Path) -> Result<Option<SchemaRef>> {
    let text = match fs::read_to_string(sidecar_path(path)) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let sidecar: Sidecar = serde_json::from_str(&text)?;
    let fields: Vec<Field> = sidecar
        .columns
        .iter()
        .map(|c| Field::new(&c.name, c.column_type.data_type(), true))
        .collect();
    Ok(Some(Arc::new(Schema::new(fields))))
}
