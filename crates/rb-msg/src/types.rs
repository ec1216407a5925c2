//! Type descriptors for ROS 2 messages.
//!
//! A [`MessageSchema`] is an ordered table of field name to [`FieldType`].
//! Field types are parsed from the strings ROS 2 reports for message fields:
//!
//! - `int32`, `float64`, `string`, `string<=10`
//! - `uint8[4]`, `float64[]`, `int8[<=3]`
//! - `sequence<uint8>`, `sequence<int32, 5>`
//! - `geometry_msgs/Point`, `sequence<geometry_msgs/msg/Point>`
//! - `builtin_interfaces/Time`, `time`, `duration`

use std::fmt;
use std::sync::Arc;

use crate::error::{MsgError, Result};

/// Type names treated as the well-known header type.
pub const HEADER_TYPES: &[&str] = &["Header", "std_msgs/Header", "roslib/Header"];

/// Deepest chain of nested messages built or decoded before giving up.
/// A schema that contains itself outside a variable-length sequence never
/// terminates, so every recursive walk over schemas stops here.
pub const MAX_NESTING: usize = 64;

/// Primitive ROS field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    Byte,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
}

impl PrimitiveType {
    /// Look up a primitive by its ROS name (ROS 1 aliases included).
    pub fn from_name(name: &str) -> Option<Self> {
        let primitive = match name {
            "bool" | "boolean" => PrimitiveType::Bool,
            "byte" | "octet" => PrimitiveType::Byte,
            "char" => PrimitiveType::Char,
            "int8" => PrimitiveType::Int8,
            "uint8" => PrimitiveType::UInt8,
            "int16" => PrimitiveType::Int16,
            "uint16" => PrimitiveType::UInt16,
            "int32" => PrimitiveType::Int32,
            "uint32" => PrimitiveType::UInt32,
            "int64" => PrimitiveType::Int64,
            "uint64" => PrimitiveType::UInt64,
            "float" | "float32" => PrimitiveType::Float32,
            "double" | "float64" => PrimitiveType::Float64,
            "string" => PrimitiveType::String,
            _ => return None,
        };
        Some(primitive)
    }

    /// Canonical ROS 2 name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Bool => "boolean",
            PrimitiveType::Byte => "octet",
            PrimitiveType::Char => "char",
            PrimitiveType::Int8 => "int8",
            PrimitiveType::UInt8 => "uint8",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::UInt16 => "uint16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::UInt32 => "uint32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::UInt64 => "uint64",
            PrimitiveType::Float32 => "float",
            PrimitiveType::Float64 => "double",
            PrimitiveType::String => "string",
        }
    }

    /// Wire size in bytes; strings report their length prefix.
    pub fn size(&self) -> usize {
        match self {
            PrimitiveType::Bool
            | PrimitiveType::Byte
            | PrimitiveType::Char
            | PrimitiveType::Int8
            | PrimitiveType::UInt8 => 1,
            PrimitiveType::Int16 | PrimitiveType::UInt16 => 2,
            PrimitiveType::Int32
            | PrimitiveType::UInt32
            | PrimitiveType::Float32
            | PrimitiveType::String => 4,
            PrimitiveType::Int64 | PrimitiveType::UInt64 | PrimitiveType::Float64 => 8,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Length constraint of an array field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayLen {
    /// `sequence<T>` / `T[]`
    Unbounded,
    /// `sequence<T, N>` / `T[<=N]`
    Bounded(usize),
    /// `T[N]`
    Fixed(usize),
}

impl ArrayLen {
    /// Check an element count against this constraint.
    pub fn admits(&self, count: usize) -> bool {
        match self {
            ArrayLen::Unbounded => true,
            ArrayLen::Bounded(max) => count <= *max,
            ArrayLen::Fixed(n) => count == *n,
        }
    }
}

/// Declared type of one message field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Primitive(PrimitiveType),
    /// `builtin_interfaces/Time`
    Time,
    /// `builtin_interfaces/Duration`
    Duration,
    /// Homogeneous array; the element is never itself an array.
    Array {
        element: Box<FieldType>,
        len: ArrayLen,
    },
    /// Nested message, by normalized type name.
    Message(String),
}

impl FieldType {
    /// Parse a fully-qualified field type string.
    pub fn parse(type_str: &str) -> Result<Self> {
        Self::parse_in(type_str, None)
    }

    /// Parse a field type string, resolving bare message names against `package`.
    pub fn parse_in(type_str: &str, package: Option<&str>) -> Result<Self> {
        let s = type_str.trim();
        let invalid = || MsgError::InvalidTypeString(type_str.to_string());

        if let Some(inner) = s
            .strip_prefix("sequence<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            let (element, len) = match inner.rsplit_once(',') {
                Some((element, bound)) => {
                    let bound = bound.trim().parse().map_err(|_| invalid())?;
                    (element.trim(), ArrayLen::Bounded(bound))
                }
                None => (inner.trim(), ArrayLen::Unbounded),
            };
            return Ok(FieldType::array(parse_element(element, package, type_str)?, len));
        }

        if s.ends_with(']') {
            let open = s.rfind('[').ok_or_else(invalid)?;
            let spec = &s[open + 1..s.len() - 1];
            let len = if spec.is_empty() {
                ArrayLen::Unbounded
            } else if let Some(bound) = spec.strip_prefix("<=") {
                ArrayLen::Bounded(bound.trim().parse().map_err(|_| invalid())?)
            } else {
                ArrayLen::Fixed(spec.trim().parse().map_err(|_| invalid())?)
            };
            return Ok(FieldType::array(
                parse_element(&s[..open], package, type_str)?,
                len,
            ));
        }

        parse_element(s, package, type_str)
    }

    /// Build an array type.
    pub fn array(element: FieldType, len: ArrayLen) -> Self {
        FieldType::Array {
            element: Box::new(element),
            len,
        }
    }

    /// `sequence<element>`
    pub fn sequence(element: FieldType) -> Self {
        Self::array(element, ArrayLen::Unbounded)
    }

    /// `element[len]`
    pub fn fixed(element: FieldType, len: usize) -> Self {
        Self::array(element, ArrayLen::Fixed(len))
    }

    /// Nested message type (name is normalized).
    pub fn message(type_name: &str) -> Self {
        FieldType::Message(normalize_type_name(type_name))
    }

    /// `uint8` or `char` arrays, fixed or variable length.
    pub fn is_byte_array(&self) -> bool {
        matches!(
            self,
            FieldType::Array { element, .. }
                if matches!(
                    element.as_ref(),
                    FieldType::Primitive(PrimitiveType::UInt8 | PrimitiveType::Char)
                )
        )
    }

    pub fn is_time(&self) -> bool {
        matches!(self, FieldType::Time | FieldType::Duration)
    }
}

impl From<PrimitiveType> for FieldType {
    fn from(primitive: PrimitiveType) -> Self {
        FieldType::Primitive(primitive)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Primitive(p) => write!(f, "{p}"),
            FieldType::Time => write!(f, "builtin_interfaces/Time"),
            FieldType::Duration => write!(f, "builtin_interfaces/Duration"),
            FieldType::Array { element, len } => match len {
                ArrayLen::Unbounded => write!(f, "sequence<{element}>"),
                ArrayLen::Bounded(n) => write!(f, "sequence<{element}, {n}>"),
                ArrayLen::Fixed(n) => write!(f, "{element}[{n}]"),
            },
            FieldType::Message(name) => write!(f, "{name}"),
        }
    }
}

fn parse_element(s: &str, package: Option<&str>, original: &str) -> Result<FieldType> {
    let s = s.trim();
    if let Some(primitive) = PrimitiveType::from_name(s) {
        return Ok(FieldType::Primitive(primitive));
    }
    if s.starts_with("string<=") {
        return Ok(FieldType::Primitive(PrimitiveType::String));
    }
    if s.is_empty() || s.starts_with("wstring") || s.contains(['<', '>', '[', ']', ' ']) {
        return Err(MsgError::InvalidTypeString(original.to_string()));
    }

    let name = normalize_type_name(s);
    match name.as_str() {
        "time" | "builtin_interfaces/Time" => return Ok(FieldType::Time),
        "duration" | "builtin_interfaces/Duration" => return Ok(FieldType::Duration),
        "Header" => return Ok(FieldType::Message("std_msgs/Header".to_string())),
        _ => {}
    }

    if name.contains('/') {
        Ok(FieldType::Message(name))
    } else if let Some(package) = package {
        Ok(FieldType::Message(format!("{package}/{name}")))
    } else {
        Err(MsgError::InvalidTypeString(original.to_string()))
    }
}

/// Collapse `pkg/msg/Type` (and `srv`/`action`) to `pkg/Type`.
pub fn normalize_type_name(name: &str) -> String {
    let parts: Vec<&str> = name.trim().split('/').collect();
    match parts.as_slice() {
        [package, "msg" | "srv" | "action", type_name] => format!("{package}/{type_name}"),
        _ => name.trim().to_string(),
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
}

/// Ordered field table of one message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl MessageSchema {
    /// Empty schema for `name`.
    pub fn new(name: &str) -> Self {
        MessageSchema {
            name: normalize_type_name(name),
            fields: Vec::new(),
        }
    }

    /// Append a field; redeclaring a name replaces its type.
    pub fn with_field(mut self, name: &str, field_type: impl Into<FieldType>) -> Self {
        let field_type = field_type.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.field_type = field_type,
            None => self.fields.push(FieldSpec {
                name: name.to_string(),
                field_type,
            }),
        }
        self
    }

    /// Build from `(field name, field type string)` pairs.
    pub fn from_field_types(name: &str, fields: &[(&str, &str)]) -> Result<Self> {
        let mut schema = MessageSchema::new(name);
        let package = package_of(&schema.name).map(str::to_string);
        for (index, (field, type_str)) in fields.iter().enumerate() {
            if schema.index_of(field).is_some() {
                return Err(MsgError::Definition {
                    type_name: schema.name.clone(),
                    line: index + 1,
                    reason: format!("duplicate field '{field}'"),
                });
            }
            let field_type = FieldType::parse_in(type_str, package.as_deref())?;
            schema.fields.push(FieldSpec {
                name: field.to_string(),
                field_type,
            });
        }
        Ok(schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field by name.
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == field)
    }

    /// Declared type of a field by name.
    pub fn field_type(&self, field: &str) -> Option<&FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| &f.field_type)
    }

    /// Whether this is the well-known header type.
    pub fn is_header(&self) -> bool {
        HEADER_TYPES.contains(&self.name.as_str())
    }
}

/// Request/response pair of a service type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSchema {
    pub request: Arc<MessageSchema>,
    pub response: Arc<MessageSchema>,
}

pub(crate) fn package_of(type_name: &str) -> Option<&str> {
    type_name.split_once('/').map(|(package, _)| package)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(
            FieldType::parse("int32").unwrap(),
            FieldType::Primitive(PrimitiveType::Int32)
        );
        assert_eq!(
            FieldType::parse("double").unwrap(),
            FieldType::Primitive(PrimitiveType::Float64)
        );
        assert_eq!(
            FieldType::parse("string<=10").unwrap(),
            FieldType::Primitive(PrimitiveType::String)
        );
        assert_eq!(
            FieldType::parse("boolean").unwrap(),
            FieldType::Primitive(PrimitiveType::Bool)
        );
    }

    #[test]
    fn test_parse_sequences() {
        assert_eq!(
            FieldType::parse("sequence<uint8>").unwrap(),
            FieldType::sequence(PrimitiveType::UInt8.into())
        );
        assert_eq!(
            FieldType::parse("sequence<int32, 5>").unwrap(),
            FieldType::array(PrimitiveType::Int32.into(), ArrayLen::Bounded(5))
        );
        assert_eq!(
            FieldType::parse("sequence<geometry_msgs/msg/Point>").unwrap(),
            FieldType::sequence(FieldType::Message("geometry_msgs/Point".to_string()))
        );
    }

    #[test]
    fn test_parse_bracket_arrays() {
        assert_eq!(
            FieldType::parse("uint8[4]").unwrap(),
            FieldType::fixed(PrimitiveType::UInt8.into(), 4)
        );
        assert_eq!(
            FieldType::parse("float64[]").unwrap(),
            FieldType::sequence(PrimitiveType::Float64.into())
        );
        assert_eq!(
            FieldType::parse("int8[<=3]").unwrap(),
            FieldType::array(PrimitiveType::Int8.into(), ArrayLen::Bounded(3))
        );
    }

    #[test]
    fn test_parse_time_types() {
        assert_eq!(FieldType::parse("builtin_interfaces/Time").unwrap(), FieldType::Time);
        assert_eq!(
            FieldType::parse("builtin_interfaces/msg/Duration").unwrap(),
            FieldType::Duration
        );
        assert_eq!(FieldType::parse("time").unwrap(), FieldType::Time);
        assert_eq!(
            FieldType::parse("sequence<builtin_interfaces/Time>").unwrap(),
            FieldType::sequence(FieldType::Time)
        );
    }

    #[test]
    fn test_parse_relative_names() {
        assert_eq!(
            FieldType::parse_in("Point", Some("geometry_msgs")).unwrap(),
            FieldType::Message("geometry_msgs/Point".to_string())
        );
        assert_eq!(
            FieldType::parse("Header").unwrap(),
            FieldType::Message("std_msgs/Header".to_string())
        );
        assert!(FieldType::parse("Point").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(FieldType::parse("").is_err());
        assert!(FieldType::parse("wstring").is_err());
        assert!(FieldType::parse("uint8[x]").is_err());
        assert!(FieldType::parse("sequence<int32, n>").is_err());
        assert!(FieldType::parse("sequence<sequence<int32>>").is_err());
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for s in [
            "int32",
            "sequence<uint8>",
            "sequence<int32, 5>",
            "double[3]",
            "builtin_interfaces/Time",
            "geometry_msgs/Point",
        ] {
            let parsed = FieldType::parse(s).unwrap();
            assert_eq!(FieldType::parse(&parsed.to_string()).unwrap(), parsed);
        }
    }

    #[test]
    fn test_byte_array_detection() {
        assert!(FieldType::parse("uint8[]").unwrap().is_byte_array());
        assert!(FieldType::parse("char[3]").unwrap().is_byte_array());
        assert!(FieldType::parse("sequence<uint8>").unwrap().is_byte_array());
        assert!(!FieldType::parse("uint8").unwrap().is_byte_array());
        assert!(!FieldType::parse("int8[]").unwrap().is_byte_array());
    }

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(normalize_type_name("std_msgs/msg/String"), "std_msgs/String");
        assert_eq!(normalize_type_name("std_srvs/srv/SetBool"), "std_srvs/SetBool");
        assert_eq!(normalize_type_name("std_msgs/String"), "std_msgs/String");
        assert_eq!(normalize_type_name("Header"), "Header");
    }

    #[test]
    fn test_schema_from_field_types() {
        let schema = MessageSchema::from_field_types(
            "geometry_msgs/msg/PointStamped",
            &[("header", "std_msgs/Header"), ("point", "Point")],
        )
        .unwrap();
        assert_eq!(schema.name(), "geometry_msgs/PointStamped");
        assert_eq!(schema.len(), 2);
        assert_eq!(
            schema.field_type("point"),
            Some(&FieldType::Message("geometry_msgs/Point".to_string()))
        );
        assert_eq!(schema.index_of("header"), Some(0));
    }

    #[test]
    fn test_schema_rejects_duplicate_fields() {
        let err = MessageSchema::from_field_types("pkg/T", &[("a", "int32"), ("a", "string")])
            .unwrap_err();
        assert!(matches!(err, MsgError::Definition { .. }));
    }

    #[test]
    fn test_header_detection() {
        assert!(MessageSchema::new("std_msgs/msg/Header").is_header());
        assert!(MessageSchema::new("Header").is_header());
        assert!(!MessageSchema::new("std_msgs/String").is_header());
    }

    #[test]
    fn test_array_len_admits() {
        assert!(ArrayLen::Unbounded.admits(100));
        assert!(ArrayLen::Bounded(3).admits(3));
        assert!(!ArrayLen::Bounded(3).admits(4));
        assert!(ArrayLen::Fixed(2).admits(2));
        assert!(!ArrayLen::Fixed(2).admits(1));
    }
}
