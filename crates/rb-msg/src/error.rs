//! Error types for message conversion and decoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::ValueKind;

/// Result type alias for message operations.
pub type Result<T> = std::result::Result<T, MsgError>;

/// Coarse error classes shared by every crate in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A path, topic or type could not be located.
    NotFound,
    /// Data does not fit the declared schema.
    SchemaMismatch,
    /// A cache format name outside the supported set.
    UnsupportedFormat,
    /// A payload could not be decoded.
    Decode,
    /// File system or storage failure.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::SchemaMismatch => write!(f, "schema_mismatch"),
            ErrorCategory::UnsupportedFormat => write!(f, "unsupported_format"),
            ErrorCategory::Decode => write!(f, "decode"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Errors raised by the message model, converter and codec.
#[derive(Error, Debug)]
pub enum MsgError {
    /// The resolver has no schema registered under this name.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Conversion role other than message/request/response.
    #[error("unknown kind \"{0}\" (expected message, request or response)")]
    UnknownRole(String),

    /// A field type string that cannot be parsed.
    #[error("invalid field type: {0}")]
    InvalidTypeString(String),

    /// A `.msg`/`.srv` definition line that cannot be parsed.
    #[error("invalid definition for {type_name} at line {line}: {reason}")]
    Definition {
        type_name: String,
        line: usize,
        reason: String,
    },

    /// Field count does not match the schema.
    #[error("{type_name} declares {expected} fields, got {actual} values")]
    FieldCount {
        type_name: String,
        expected: usize,
        actual: usize,
    },

    /// Mapping key with no matching schema field.
    #[error("message type \"{type_name}\" has no field named \"{field}\"")]
    UnknownField { type_name: String, field: String },

    /// Declared fields absent from the mapping.
    #[error("missing fields for {type_name}: {}", fields.join(", "))]
    MissingFields {
        type_name: String,
        fields: Vec<String>,
    },

    /// Host value category outside the declared type's allow-list.
    #[error("field '{field}' has wrong type {kind} (valid types: {allowed})")]
    TypeMismatch {
        field: String,
        kind: ValueKind,
        allowed: String,
    },

    /// Value that cannot be coerced into the declared type.
    #[error("field '{field}' cannot hold {reason} as {expected}")]
    InvalidValue {
        field: String,
        expected: String,
        reason: String,
    },

    /// Byte-array field with a malformed base64 string.
    #[error("field '{field}' is not valid base64: {source}")]
    Base64 {
        field: String,
        #[source]
        source: base64::DecodeError,
    },

    /// Nested message chain longer than [`crate::MAX_NESTING`], e.g. a type
    /// that contains itself.
    #[error("{type_name} nests messages deeper than {limit} levels")]
    NestingTooDeep { type_name: String, limit: usize },

    /// Malformed CDR payload.
    #[error("CDR decode error at byte {offset}: {reason}")]
    Decode { offset: usize, reason: String },

    /// Message value that does not match its schema during encoding.
    #[error("CDR encode error in field '{field}': {reason}")]
    Encode { field: String, reason: String },
}

impl MsgError {
    /// Map this error onto the workspace-wide taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            MsgError::UnknownType(_) => ErrorCategory::NotFound,
            MsgError::Decode { .. } => ErrorCategory::Decode,
            MsgError::UnknownRole(_)
            | MsgError::InvalidTypeString(_)
            | MsgError::Definition { .. }
            | MsgError::FieldCount { .. }
            | MsgError::UnknownField { .. }
            | MsgError::MissingFields { .. }
            | MsgError::NestingTooDeep { .. }
            | MsgError::TypeMismatch { .. }
            | MsgError::InvalidValue { .. }
            | MsgError::Base64 { .. }
            | MsgError::Encode { .. } => ErrorCategory::SchemaMismatch,
        }
    }

    pub(crate) fn invalid(
        field: &str,
        expected: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        MsgError::InvalidValue {
            field: field.to_string(),
            expected: expected.to_string(),
            reason: reason.into(),
        }
    }
}
