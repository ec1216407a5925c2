//! ROS 2 message model and converter.
//!
//! This crate provides:
//! - Type descriptors parsed from ROS 2 field type strings and `.msg`/`.srv` text
//! - Typed messages and insertion-ordered dictionary values
//! - Bidirectional message <-> dictionary conversion with type allow-lists
//! - Flattening of nested dictionaries into `path -> scalar` rows
//! - A CDR (XCDR1) codec for rosbag2 payloads

pub mod cdr;
pub mod convert;
pub mod error;
pub mod flatten;
pub mod message;
pub mod registry;
pub mod types;
pub mod value;

pub use cdr::{CdrDeserializer, CdrSerializer, Endianness, MessageDeserializer};
pub use convert::{
    allowed_kinds, dict_to_message, message_to_dict, ConvertOptions, MessageRole, TypeRef,
};
pub use error::{ErrorCategory, MsgError, Result};
pub use flatten::{flatten, SEPARATOR};
pub use message::{FieldValue, Message, Stamp};
pub use registry::{parse_definition, Registry, SchemaResolver};
pub use types::{
    normalize_type_name, ArrayLen, FieldSpec, FieldType, MessageSchema, PrimitiveType,
    ServiceSchema, HEADER_TYPES, MAX_NESTING,
};
pub use value::{Dict, Value, ValueKind};
