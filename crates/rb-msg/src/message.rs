//! Typed message values.

use std::sync::Arc;

use crate::error::{MsgError, Result};
use crate::registry::SchemaResolver;
use crate::types::{ArrayLen, FieldSpec, FieldType, MessageSchema, PrimitiveType, MAX_NESTING};

/// `builtin_interfaces` time/duration pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Stamp {
    pub sec: i32,
    pub nanosec: u32,
}

impl Stamp {
    pub fn new(sec: i32, nanosec: u32) -> Self {
        Stamp { sec, nanosec }
    }

    /// Total nanoseconds.
    pub fn as_nanos(&self) -> i64 {
        i64::from(self.sec) * 1_000_000_000 + i64::from(self.nanosec)
    }
}

/// Value held by one message field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Byte(u8),
    Char(u8),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Time(Stamp),
    Duration(Stamp),
    /// `uint8`/`char` arrays.
    Bytes(Vec<u8>),
    Array(Vec<FieldValue>),
    Message(Message),
}

impl FieldValue {
    /// Short shape name for diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Byte(_) => "byte",
            FieldValue::Char(_) => "char",
            FieldValue::Int8(_) => "int8",
            FieldValue::UInt8(_) => "uint8",
            FieldValue::Int16(_) => "int16",
            FieldValue::UInt16(_) => "uint16",
            FieldValue::Int32(_) => "int32",
            FieldValue::UInt32(_) => "uint32",
            FieldValue::Int64(_) => "int64",
            FieldValue::UInt64(_) => "uint64",
            FieldValue::Float32(_) => "float32",
            FieldValue::Float64(_) => "float64",
            FieldValue::String(_) => "string",
            FieldValue::Time(_) => "time",
            FieldValue::Duration(_) => "duration",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Array(_) => "array",
            FieldValue::Message(_) => "message",
        }
    }

    /// Zero value of a primitive type.
    pub fn zero(primitive: PrimitiveType) -> Self {
        match primitive {
            PrimitiveType::Bool => FieldValue::Bool(false),
            PrimitiveType::Byte => FieldValue::Byte(0),
            PrimitiveType::Char => FieldValue::Char(0),
            PrimitiveType::Int8 => FieldValue::Int8(0),
            PrimitiveType::UInt8 => FieldValue::UInt8(0),
            PrimitiveType::Int16 => FieldValue::Int16(0),
            PrimitiveType::UInt16 => FieldValue::UInt16(0),
            PrimitiveType::Int32 => FieldValue::Int32(0),
            PrimitiveType::UInt32 => FieldValue::UInt32(0),
            PrimitiveType::Int64 => FieldValue::Int64(0),
            PrimitiveType::UInt64 => FieldValue::UInt64(0),
            PrimitiveType::Float32 => FieldValue::Float32(0.0),
            PrimitiveType::Float64 => FieldValue::Float64(0.0),
            PrimitiveType::String => FieldValue::String(String::new()),
        }
    }

    /// Default value of a declared type; nested messages go through `resolver`.
    pub fn default_for(field_type: &FieldType, resolver: &dyn SchemaResolver) -> Result<Self> {
        FieldValue::default_at(field_type, resolver, 0)
    }

    fn default_at(field_type: &FieldType, resolver: &dyn SchemaResolver, depth: usize) -> Result<Self> {
        let value = match field_type {
            FieldType::Primitive(p) => FieldValue::zero(*p),
            FieldType::Time => FieldValue::Time(Stamp::default()),
            FieldType::Duration => FieldValue::Duration(Stamp::default()),
            FieldType::Array { element, len } => {
                let count = match len {
                    ArrayLen::Fixed(n) => *n,
                    ArrayLen::Unbounded | ArrayLen::Bounded(_) => 0,
                };
                if field_type.is_byte_array() {
                    FieldValue::Bytes(vec![0; count])
                } else {
                    let items = (0..count)
                        .map(|_| FieldValue::default_at(element, resolver, depth))
                        .collect::<Result<Vec<_>>>()?;
                    FieldValue::Array(items)
                }
            }
            FieldType::Message(name) => {
                let schema = resolver.resolve_message(name)?;
                FieldValue::Message(Message::default_at(&schema, resolver, depth + 1)?)
            }
        };
        Ok(value)
    }
}

/// A typed message instance: its schema plus one value per declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    schema: Arc<MessageSchema>,
    values: Vec<FieldValue>,
}

impl Message {
    /// Build from values given in schema order.
    pub fn new(schema: Arc<MessageSchema>, values: Vec<FieldValue>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(MsgError::FieldCount {
                type_name: schema.name().to_string(),
                expected: schema.len(),
                actual: values.len(),
            });
        }
        Ok(Message { schema, values })
    }

    /// Message with every field at its type default.
    ///
    /// Fails with [`MsgError::NestingTooDeep`] when the schema contains
    /// itself through a non-empty field.
    pub fn default_for(schema: &Arc<MessageSchema>, resolver: &dyn SchemaResolver) -> Result<Self> {
        Message::default_at(schema, resolver, 0)
    }

    fn default_at(
        schema: &Arc<MessageSchema>,
        resolver: &dyn SchemaResolver,
        depth: usize,
    ) -> Result<Self> {
        if depth > MAX_NESTING {
            return Err(MsgError::NestingTooDeep {
                type_name: schema.name().to_string(),
                limit: MAX_NESTING,
            });
        }
        let values = schema
            .fields()
            .iter()
            .map(|f| FieldValue::default_at(&f.field_type, resolver, depth))
            .collect::<Result<Vec<_>>>()?;
        Ok(Message {
            schema: Arc::clone(schema),
            values,
        })
    }

    pub fn schema(&self) -> &Arc<MessageSchema> {
        &self.schema
    }

    pub fn type_name(&self) -> &str {
        self.schema.name()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.schema.index_of(field).map(|i| &self.values[i])
    }

    /// Replace a field value by name.
    pub fn set(&mut self, field: &str, value: FieldValue) -> Result<()> {
        let index = self
            .schema
            .index_of(field)
            .ok_or_else(|| MsgError::UnknownField {
                type_name: self.schema.name().to_string(),
                field: field.to_string(),
            })?;
        self.values[index] = value;
        Ok(())
    }

    pub(crate) fn set_index(&mut self, index: usize, value: FieldValue) {
        self.values[index] = value;
    }

    /// Declared fields paired with their values, in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldSpec, &FieldValue)> {
        self.schema.fields().iter().zip(self.values.iter())
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }
}
