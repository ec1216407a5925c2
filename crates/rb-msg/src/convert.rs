//! Conversion between typed messages and plain dictionaries.
//!
//! Both directions walk the schema with one recursive function. Field
//! handling by declared type:
//!
//! | declared type            | dictionary form                    |
//! |--------------------------|------------------------------------|
//! | primitive                | scalar value                       |
//! | time / duration          | `{secs, nsecs}`                    |
//! | `uint8`/`char` array     | base64 string                      |
//! | other array              | list, element-wise                 |
//! | nested message           | dict, recursive                    |

use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;

use crate::error::{MsgError, Result};
use crate::message::{FieldValue, Message, Stamp};
use crate::registry::SchemaResolver;
use crate::types::{ArrayLen, FieldType, MessageSchema, PrimitiveType};
use crate::value::{Dict, Value, ValueKind};

/// Which descriptor a type name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageRole {
    #[default]
    Message,
    /// Request half of a service.
    Request,
    /// Response half of a service.
    Response,
}

impl FromStr for MessageRole {
    type Err = MsgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "message" => Ok(MessageRole::Message),
            "request" => Ok(MessageRole::Request),
            "response" => Ok(MessageRole::Response),
            other => Err(MsgError::UnknownRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::Message => write!(f, "message"),
            MessageRole::Request => write!(f, "request"),
            MessageRole::Response => write!(f, "response"),
        }
    }
}

/// Target of a dictionary conversion: a name to resolve, or a descriptor.
#[derive(Debug, Clone, Copy)]
pub enum TypeRef<'a> {
    Name(&'a str),
    Schema(&'a Arc<MessageSchema>),
}

impl<'a> From<&'a str> for TypeRef<'a> {
    fn from(name: &'a str) -> Self {
        TypeRef::Name(name)
    }
}

impl<'a> From<&'a String> for TypeRef<'a> {
    fn from(name: &'a String) -> Self {
        TypeRef::Name(name)
    }
}

impl<'a> From<&'a Arc<MessageSchema>> for TypeRef<'a> {
    fn from(schema: &'a Arc<MessageSchema>) -> Self {
        TypeRef::Schema(schema)
    }
}

/// Switches for [`dict_to_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Fail on mapping keys the schema does not declare (otherwise warn).
    pub strict_mode: bool,
    /// Fail when the mapping does not cover every declared field.
    pub check_missing_fields: bool,
    /// Check primitive values against the per-type allow-list.
    pub check_types: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            strict_mode: true,
            check_missing_fields: false,
            check_types: true,
        }
    }
}

impl ConvertOptions {
    pub fn with_strict_mode(mut self, enabled: bool) -> Self {
        self.strict_mode = enabled;
        self
    }

    pub fn with_check_missing_fields(mut self, enabled: bool) -> Self {
        self.check_missing_fields = enabled;
        self
    }

    pub fn with_check_types(mut self, enabled: bool) -> Self {
        self.check_types = enabled;
        self
    }
}

/// Host value categories accepted for each primitive type.
///
/// Wide integers are left out of the float lists where the conversion could
/// change the value.
pub fn allowed_kinds(primitive: PrimitiveType) -> &'static [ValueKind] {
    use ValueKind::*;
    match primitive {
        PrimitiveType::Bool => &[Bool],
        PrimitiveType::Float32 => &[Float, Int, F32, I8, I16, U8, U16],
        PrimitiveType::Float64 => &[Float, Int, F32, F64, I8, I16, I32, U8, U16, U32],
        PrimitiveType::Int8 => &[Int, I8],
        PrimitiveType::Int16 => &[Int, I8, I16, U8],
        PrimitiveType::Int32 => &[Int, I8, I16, I32, U8, U16],
        PrimitiveType::Int64 => &[Int, I8, I16, I32, I64, U8, U16, U32],
        PrimitiveType::UInt8 => &[Int, U8],
        PrimitiveType::UInt16 => &[Int, U8, U16],
        PrimitiveType::UInt32 => &[Int, U8, U16, U32],
        PrimitiveType::UInt64 => &[Int, U8, U16, U32, U64],
        PrimitiveType::Byte => &[Int, U8],
        PrimitiveType::Char => &[Int, U8],
        PrimitiveType::String => &[Str],
    }
}

// ============================================================================
// Message -> dictionary
// ============================================================================

/// Convert a typed message into a nested dictionary.
///
/// Conversion never fails. A value whose shape does not match its declared
/// type becomes `Null`; a nested message that cannot be converted is left
/// out of the result. Both cases only emit a warning, so callers that need
/// every field must check the output themselves.
pub fn message_to_dict(message: &Message) -> Dict {
    let mut dict = Dict::with_capacity(message.schema().len());
    for (spec, value) in message.fields() {
        if let Some(converted) = value_to_dict(&spec.name, &spec.field_type, value) {
            dict.insert(spec.name.clone(), converted);
        }
    }
    dict
}

fn value_to_dict(field: &str, field_type: &FieldType, value: &FieldValue) -> Option<Value> {
    match (field_type, value) {
        (FieldType::Primitive(primitive), value) => Some(
            primitive_to_value(*primitive, value)
                .unwrap_or_else(|| unsupported(field, field_type, value)),
        ),
        (FieldType::Time, FieldValue::Time(stamp))
        | (FieldType::Duration, FieldValue::Duration(stamp)) => Some(stamp_to_value(stamp)),
        (FieldType::Array { .. }, FieldValue::Bytes(bytes)) if field_type.is_byte_array() => {
            Some(Value::Str(STANDARD.encode(bytes)))
        }
        (FieldType::Array { element, .. }, FieldValue::Array(items)) => Some(Value::List(
            items
                .iter()
                .filter_map(|item| value_to_dict(field, element, item))
                .collect(),
        )),
        (FieldType::Message(_), FieldValue::Message(nested)) => {
            Some(Value::Dict(message_to_dict(nested)))
        }
        (FieldType::Message(type_name), other) => {
            warn!(
                field,
                type_name = type_name.as_str(),
                found = other.shape(),
                "Cannot convert nested message field; omitting it"
            );
            None
        }
        (_, other) => Some(unsupported(field, field_type, other)),
    }
}

fn unsupported(field: &str, field_type: &FieldType, value: &FieldValue) -> Value {
    warn!(
        field,
        declared = %field_type,
        found = value.shape(),
        "Unsupported value for declared type; storing None"
    );
    Value::Null
}

fn primitive_to_value(primitive: PrimitiveType, value: &FieldValue) -> Option<Value> {
    let converted = match (primitive, value) {
        (PrimitiveType::Bool, FieldValue::Bool(v)) => Value::Bool(*v),
        (PrimitiveType::Byte, FieldValue::Byte(v))
        | (PrimitiveType::Char, FieldValue::Char(v))
        | (PrimitiveType::UInt8, FieldValue::UInt8(v)) => Value::Int(i64::from(*v)),
        (PrimitiveType::Int8, FieldValue::Int8(v)) => Value::Int(i64::from(*v)),
        (PrimitiveType::Int16, FieldValue::Int16(v)) => Value::Int(i64::from(*v)),
        (PrimitiveType::UInt16, FieldValue::UInt16(v)) => Value::Int(i64::from(*v)),
        (PrimitiveType::Int32, FieldValue::Int32(v)) => Value::Int(i64::from(*v)),
        (PrimitiveType::UInt32, FieldValue::UInt32(v)) => Value::Int(i64::from(*v)),
        (PrimitiveType::Int64, FieldValue::Int64(v)) => Value::Int(*v),
        (PrimitiveType::UInt64, FieldValue::UInt64(v)) => Value::U64(*v),
        (PrimitiveType::Float32, FieldValue::Float32(v)) => Value::Float(f64::from(*v)),
        (PrimitiveType::Float64, FieldValue::Float64(v)) => Value::Float(*v),
        (PrimitiveType::String, FieldValue::String(v)) => Value::Str(v.clone()),
        _ => return None,
    };
    Some(converted)
}

fn stamp_to_value(stamp: &Stamp) -> Value {
    let mut dict = Dict::with_capacity(2);
    dict.insert("secs", Value::Int(i64::from(stamp.sec)));
    dict.insert("nsecs", Value::Int(i64::from(stamp.nanosec)));
    Value::Dict(dict)
}

// ============================================================================
// Dictionary -> message
// ============================================================================

/// Build a typed message from a dictionary.
///
/// `target` is either a type name, resolved through `resolver` according to
/// `role`, or a descriptor used as is. Fields absent from `dict` keep their
/// type defaults unless `options.check_missing_fields` is set.
pub fn dict_to_message<'a>(
    resolver: &dyn SchemaResolver,
    target: impl Into<TypeRef<'a>>,
    role: MessageRole,
    dict: &Dict,
    options: ConvertOptions,
) -> Result<Message> {
    let schema = match target.into() {
        TypeRef::Schema(schema) => Arc::clone(schema),
        TypeRef::Name(name) => match role {
            MessageRole::Message => resolver.resolve_message(name)?,
            MessageRole::Request => resolver.resolve_service(name)?.request,
            MessageRole::Response => resolver.resolve_service(name)?.response,
        },
    };
    build_message(&schema, dict, resolver, options)
}

fn build_message(
    schema: &Arc<MessageSchema>,
    dict: &Dict,
    resolver: &dyn SchemaResolver,
    options: ConvertOptions,
) -> Result<Message> {
    let mut message = Message::default_for(schema, resolver)?;
    let mut seen = vec![false; schema.len()];

    for (key, value) in dict.iter() {
        match schema.index_of(key) {
            Some(index) => {
                let field_type = &schema.fields()[index].field_type;
                let converted = value_from_dict(key, field_type, value, resolver, options)?;
                message.set_index(index, converted);
                seen[index] = true;
            }
            None if schema.is_header() => {}
            None if options.strict_mode => {
                return Err(MsgError::UnknownField {
                    type_name: schema.name().to_string(),
                    field: key.to_string(),
                });
            }
            None => {
                warn!(
                    type_name = schema.name(),
                    field = key,
                    "Message type has no such field; it will be ignored"
                );
            }
        }
    }

    if options.check_missing_fields {
        let missing: Vec<String> = schema
            .fields()
            .iter()
            .zip(&seen)
            .filter(|(_, seen)| !**seen)
            .map(|(spec, _)| spec.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(MsgError::MissingFields {
                type_name: schema.name().to_string(),
                fields: missing,
            });
        }
    }

    Ok(message)
}

fn value_from_dict(
    field: &str,
    field_type: &FieldType,
    value: &Value,
    resolver: &dyn SchemaResolver,
    options: ConvertOptions,
) -> Result<FieldValue> {
    match field_type {
        FieldType::Array { len, .. } if field_type.is_byte_array() => {
            bytes_from_value(field, value, *len).map(FieldValue::Bytes)
        }
        FieldType::Time => stamp_from_value(field, value).map(FieldValue::Time),
        FieldType::Duration => stamp_from_value(field, value).map(FieldValue::Duration),
        FieldType::Primitive(primitive) => {
            if options.check_types {
                check_allowed(field, *primitive, value)?;
            }
            coerce_primitive(field, *primitive, value)
        }
        FieldType::Array { element, len } => {
            let items = value
                .as_list()
                .ok_or_else(|| MsgError::invalid(field, field_type, format!("a {}", value.kind())))?;
            check_len(field, field_type, *len, items.len())?;
            items
                .iter()
                .map(|item| value_from_dict(field, element, item, resolver, options))
                .collect::<Result<Vec<_>>>()
                .map(FieldValue::Array)
        }
        FieldType::Message(type_name) => {
            let dict = value
                .as_dict()
                .ok_or_else(|| MsgError::invalid(field, type_name, format!("a {}", value.kind())))?;
            let schema = resolver.resolve_message(type_name)?;
            build_message(&schema, dict, resolver, options).map(FieldValue::Message)
        }
    }
}

fn check_allowed(field: &str, primitive: PrimitiveType, value: &Value) -> Result<()> {
    let allowed = allowed_kinds(primitive);
    if allowed.contains(&value.kind()) {
        return Ok(());
    }
    Err(MsgError::TypeMismatch {
        field: field.to_string(),
        kind: value.kind(),
        allowed: allowed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn check_len(field: &str, field_type: &FieldType, len: ArrayLen, count: usize) -> Result<()> {
    if len.admits(count) {
        Ok(())
    } else {
        Err(MsgError::invalid(
            field,
            field_type,
            format!("{count} elements"),
        ))
    }
}

fn coerce_primitive(field: &str, primitive: PrimitiveType, value: &Value) -> Result<FieldValue> {
    let mismatch = || MsgError::invalid(field, primitive, format!("a {}", value.kind()));

    match primitive {
        PrimitiveType::Bool => value.as_bool().map(FieldValue::Bool).ok_or_else(mismatch),
        PrimitiveType::String => value
            .as_str()
            .map(|s| FieldValue::String(s.to_string()))
            .ok_or_else(mismatch),
        PrimitiveType::Float32 => {
            let v = value.as_f64().ok_or_else(mismatch)?;
            let narrowed = v as f32;
            // NaN and infinities carry over; finite values must stay finite.
            if v.is_finite() && !narrowed.is_finite() {
                return Err(MsgError::invalid(field, primitive, format!("out-of-range value {v}")));
            }
            Ok(FieldValue::Float32(narrowed))
        }
        PrimitiveType::Float64 => value.as_f64().map(FieldValue::Float64).ok_or_else(mismatch),
        integer => {
            let n = value.as_i128().ok_or_else(mismatch)?;
            let out_of_range = || MsgError::invalid(field, integer, format!("out-of-range value {n}"));
            let converted = match integer {
                PrimitiveType::Byte => u8::try_from(n).map(FieldValue::Byte),
                PrimitiveType::Char => u8::try_from(n).map(FieldValue::Char),
                PrimitiveType::Int8 => i8::try_from(n).map(FieldValue::Int8),
                PrimitiveType::UInt8 => u8::try_from(n).map(FieldValue::UInt8),
                PrimitiveType::Int16 => i16::try_from(n).map(FieldValue::Int16),
                PrimitiveType::UInt16 => u16::try_from(n).map(FieldValue::UInt16),
                PrimitiveType::Int32 => i32::try_from(n).map(FieldValue::Int32),
                PrimitiveType::UInt32 => u32::try_from(n).map(FieldValue::UInt32),
                PrimitiveType::Int64 => i64::try_from(n).map(FieldValue::Int64),
                PrimitiveType::UInt64 => u64::try_from(n).map(FieldValue::UInt64),
                PrimitiveType::Bool
                | PrimitiveType::String
                | PrimitiveType::Float32
                | PrimitiveType::Float64 => return Err(mismatch()),
            };
            converted.map_err(|_| out_of_range())
        }
    }
}

fn bytes_from_value(field: &str, value: &Value, len: ArrayLen) -> Result<Vec<u8>> {
    let bytes = match value {
        Value::Str(encoded) => STANDARD
            .decode(encoded)
            .map_err(|source| MsgError::Base64 {
                field: field.to_string(),
                source,
            })?,
        Value::List(items) => items
            .iter()
            .map(|item| {
                item.as_i128()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| MsgError::invalid(field, "byte", format!("{item}")))
            })
            .collect::<Result<Vec<u8>>>()?,
        other => {
            return Err(MsgError::invalid(
                field,
                "byte array",
                format!("a {}", other.kind()),
            ))
        }
    };
    if !len.admits(bytes.len()) {
        return Err(MsgError::invalid(
            field,
            "byte array",
            format!("{} bytes", bytes.len()),
        ));
    }
    Ok(bytes)
}

fn stamp_from_value(field: &str, value: &Value) -> Result<Stamp> {
    let dict = value
        .as_dict()
        .ok_or_else(|| MsgError::invalid(field, "time", format!("a {}", value.kind())))?;
    let mut stamp = Stamp::default();
    if let Some(secs) = dict.get("secs") {
        stamp.sec = secs
            .as_i128()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| MsgError::invalid(field, "time secs", format!("{secs}")))?;
    }
    if let Some(nsecs) = dict.get("nsecs") {
        stamp.nanosec = nsecs
            .as_i128()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| MsgError::invalid(field, "time nsecs", format!("{nsecs}")))?;
    }
    Ok(stamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn registry() -> Registry {
        let mut registry = Registry::with_builtins();
        registry
            .register_fields("pkg/Scalar", &[("value", "float32"), ("count", "int32")])
            .unwrap();
        registry
    }

    fn dict(entries: &[(&str, Value)]) -> Dict {
        entries.iter().cloned().collect()
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("message".parse::<MessageRole>().unwrap(), MessageRole::Message);
        assert_eq!("request".parse::<MessageRole>().unwrap(), MessageRole::Request);
        assert_eq!("response".parse::<MessageRole>().unwrap(), MessageRole::Response);
        assert!(matches!(
            "goal".parse::<MessageRole>(),
            Err(MsgError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_options_default() {
        let options = ConvertOptions::default();
        assert!(options.strict_mode);
        assert!(!options.check_missing_fields);
        assert!(options.check_types);
    }

    #[test]
    fn test_string_rejected_for_float32() {
        let registry = registry();
        let err = dict_to_message(
            &registry,
            "pkg/Scalar",
            MessageRole::Message,
            &dict(&[("value", Value::from("1.5"))]),
            ConvertOptions::default(),
        )
        .unwrap_err();
        match err {
            MsgError::TypeMismatch { field, kind, allowed } => {
                assert_eq!(field, "value");
                assert_eq!(kind, ValueKind::Str);
                assert!(allowed.contains("float"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_int32_kind_rejected_for_float32() {
        let registry = registry();
        let err = dict_to_message(
            &registry,
            "pkg/Scalar",
            MessageRole::Message,
            &dict(&[("value", Value::I32(i32::MAX))]),
            ConvertOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MsgError::TypeMismatch { kind: ValueKind::I32, .. }));
    }

    #[test]
    fn test_check_types_off_still_refuses_lossy_coercion() {
        let registry = registry();
        let options = ConvertOptions::default().with_check_types(false);

        // Fixed-width kind outside the allow-list goes through when unchecked.
        let msg = dict_to_message(
            &registry,
            "pkg/Scalar",
            MessageRole::Message,
            &dict(&[("count", Value::I64(12))]),
            options,
        )
        .unwrap();
        assert_eq!(msg.get("count"), Some(&FieldValue::Int32(12)));

        // Out of range or a float for an integer field is never accepted.
        for bad in [Value::Int(i64::from(i32::MAX) + 1), Value::Float(1.5), Value::from("x")] {
            let err = dict_to_message(
                &registry,
                "pkg/Scalar",
                MessageRole::Message,
                &dict(&[("count", bad)]),
                options,
            )
            .unwrap_err();
            assert!(matches!(err, MsgError::InvalidValue { .. }), "{err}");
        }
    }

    #[test]
    fn test_request_and_response_roles() {
        let mut registry = registry();
        registry
            .register_service_definition("std_srvs/srv/SetBool", "bool data\n---\nbool success\nstring message")
            .unwrap();

        let request = dict_to_message(
            &registry,
            "std_srvs/srv/SetBool",
            MessageRole::Request,
            &dict(&[("data", Value::Bool(true))]),
            ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(request.get("data"), Some(&FieldValue::Bool(true)));

        let response = dict_to_message(
            &registry,
            "std_srvs/srv/SetBool",
            MessageRole::Response,
            &dict(&[("message", Value::from("ok"))]),
            ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(response.get("success"), Some(&FieldValue::Bool(false)));
        assert_eq!(response.get("message"), Some(&FieldValue::String("ok".into())));
    }

    #[test]
    fn test_unknown_type_name() {
        let registry = registry();
        let err = dict_to_message(
            &registry,
            "pkg/Missing",
            MessageRole::Message,
            &Dict::new(),
            ConvertOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::NotFound);
    }

    #[test]
    fn test_header_ignores_unknown_keys_even_when_strict() {
        let registry = registry();
        let msg = dict_to_message(
            &registry,
            "std_msgs/msg/Header",
            MessageRole::Message,
            &dict(&[
                ("frame_id", Value::from("map")),
                ("seq", Value::Int(3)),
            ]),
            ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(msg.get("frame_id"), Some(&FieldValue::String("map".into())));
    }

    #[test]
    fn test_time_from_partial_dict() {
        let registry = registry();
        let msg = dict_to_message(
            &registry,
            "std_msgs/Header",
            MessageRole::Message,
            &dict(&[("stamp", Value::Dict(dict(&[("secs", Value::Int(5))])))]),
            ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(msg.get("stamp"), Some(&FieldValue::Time(Stamp::new(5, 0))));
    }

    #[test]
    fn test_byte_array_accepts_base64_and_int_list() {
        let mut registry = registry();
        let schema = registry
            .register_fields("pkg/Blob", &[("data", "sequence<uint8>"), ("id", "uint8[2]")])
            .unwrap();

        let msg = dict_to_message(
            &registry,
            &schema,
            MessageRole::Message,
            &dict(&[
                ("data", Value::from("AQID")),
                ("id", Value::List(vec![Value::Int(9), Value::U8(10)])),
            ]),
            ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(msg.get("data"), Some(&FieldValue::Bytes(vec![1, 2, 3])));
        assert_eq!(msg.get("id"), Some(&FieldValue::Bytes(vec![9, 10])));

        let err = dict_to_message(
            &registry,
            &schema,
            MessageRole::Message,
            &dict(&[("data", Value::from("***"))]),
            ConvertOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MsgError::Base64 { .. }));

        let err = dict_to_message(
            &registry,
            &schema,
            MessageRole::Message,
            &dict(&[("id", Value::from("AQID"))]),
            ConvertOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MsgError::InvalidValue { .. }));
    }

    #[test]
    fn test_fixed_array_length_enforced() {
        let mut registry = registry();
        registry
            .register_fields("pkg/Vec3", &[("v", "float64[3]")])
            .unwrap();
        let err = dict_to_message(
            &registry,
            "pkg/Vec3",
            MessageRole::Message,
            &dict(&[("v", Value::List(vec![Value::Float(1.0)]))]),
            ConvertOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MsgError::InvalidValue { .. }));
    }

    #[test]
    fn test_mismatched_values_become_none_or_are_omitted() {
        let schema = Arc::new(
            MessageSchema::new("pkg/Odd")
                .with_field("number", PrimitiveType::Float64)
                .with_field("stamp", FieldType::Time)
                .with_field("inner", FieldType::message("pkg/Inner"))
                .with_field("ok", PrimitiveType::Bool),
        );
        let msg = Message::new(
            schema,
            vec![
                FieldValue::String("not a number".into()),
                FieldValue::Bytes(vec![1]),
                FieldValue::Int32(1),
                FieldValue::Bool(true),
            ],
        )
        .unwrap();

        let out = message_to_dict(&msg);
        assert_eq!(out.get("number"), Some(&Value::Null));
        assert_eq!(out.get("stamp"), Some(&Value::Null));
        assert!(!out.contains_key("inner"), "unconvertible nested field is dropped");
        assert_eq!(out.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["number", "stamp", "ok"]);
    }

    #[test]
    fn test_float32_overflow_is_invalid() {
        let registry = registry();
        let err = dict_to_message(
            &registry,
            "pkg/Scalar",
            MessageRole::Message,
            &dict(&[("value", Value::Float(1e300))]),
            ConvertOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MsgError::InvalidValue { ref field, .. } if field == "value"), "{err}");

        // Non-finite input is stored as given.
        let msg = dict_to_message(
            &registry,
            "pkg/Scalar",
            MessageRole::Message,
            &dict(&[("value", Value::Float(f64::NEG_INFINITY))]),
            ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(msg.get("value"), Some(&FieldValue::Float32(f32::NEG_INFINITY)));

        let msg = dict_to_message(
            &registry,
            "pkg/Scalar",
            MessageRole::Message,
            &dict(&[("value", Value::Float(f64::from(f32::MAX)))]),
            ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(msg.get("value"), Some(&FieldValue::Float32(f32::MAX)));
    }

    #[test]
    fn test_byte_field_takes_unsigned_kinds() {
        let mut registry = registry();
        registry.register_fields("pkg/Flag", &[("raw", "byte")]).unwrap();

        let msg = dict_to_message(
            &registry,
            "pkg/Flag",
            MessageRole::Message,
            &dict(&[("raw", Value::U8(200))]),
            ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(msg.get("raw"), Some(&FieldValue::Byte(200)));

        let err = dict_to_message(
            &registry,
            "pkg/Flag",
            MessageRole::Message,
            &dict(&[("raw", Value::I8(-1))]),
            ConvertOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MsgError::TypeMismatch { kind: ValueKind::I8, .. }), "{err}");
    }

    #[test]
    fn test_allowed_kinds_table() {
        assert_eq!(allowed_kinds(PrimitiveType::Byte), &[ValueKind::Int, ValueKind::U8]);
        assert!(allowed_kinds(PrimitiveType::Float64).contains(&ValueKind::I32));
        assert!(!allowed_kinds(PrimitiveType::Float32).contains(&ValueKind::I32));
        assert!(!allowed_kinds(PrimitiveType::Float64).contains(&ValueKind::I64));
        assert!(!allowed_kinds(PrimitiveType::Int32).contains(&ValueKind::Bool));
        assert_eq!(allowed_kinds(PrimitiveType::String), &[ValueKind::Str]);
    }
}
