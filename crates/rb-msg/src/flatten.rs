//! Flattening of nested dictionaries into single-level rows.

use crate::value::{Dict, Value};

/// Path separator between nested keys and list indices.
pub const SEPARATOR: char = '/';

/// Flatten `dict` into `path -> scalar` entries.
///
/// `{a: {b: 1, c: [10, 20]}}` becomes `{a/b: 1, a/c/0: 10, a/c/1: 20}`.
/// Containers inside lists are flattened further; empty containers
/// contribute no keys. Key order follows a depth-first walk of the input.
pub fn flatten(dict: &Dict) -> Dict {
    let mut out = Dict::new();
    flatten_dict(dict, None, &mut out);
    out
}

fn flatten_dict(dict: &Dict, prefix: Option<&str>, out: &mut Dict) {
    for (key, value) in dict.iter() {
        let path = join(prefix, key);
        flatten_value(value, path, out);
    }
}

fn flatten_value(value: &Value, path: String, out: &mut Dict) {
    match value {
        Value::Dict(nested) => flatten_dict(nested, Some(&path), out),
        Value::List(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_value(item, join(Some(&path), &index.to_string()), out);
            }
        }
        scalar => {
            out.insert(path, scalar.clone());
        }
    }
}

fn join(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{SEPARATOR}{key}"),
        None => key.to_string(),
    }
}
