//! CDR (XCDR1) codec for rosbag2 payloads.
//!
//! Every payload starts with a 4-byte encapsulation header whose second byte
//! selects the byte order (`0x00` big endian, `0x01` little endian). The body
//! aligns each primitive to its own size, counted from the end of the header.

use std::sync::Arc;

use crate::error::{MsgError, Result};
use crate::message::{FieldValue, Message, Stamp};
use crate::registry::SchemaResolver;
use crate::types::{ArrayLen, FieldType, MessageSchema, PrimitiveType, MAX_NESTING};

const HEADER_LEN: usize = 4;

/// Raw bytes + type descriptor -> typed message.
pub trait MessageDeserializer {
    fn deserialize(&self, data: &[u8], schema: &Arc<MessageSchema>) -> Result<Message>;
}

impl<T: MessageDeserializer + ?Sized> MessageDeserializer for &T {
    fn deserialize(&self, data: &[u8], schema: &Arc<MessageSchema>) -> Result<Message> {
        (**self).deserialize(data, schema)
    }
}

impl<T: MessageDeserializer + ?Sized> MessageDeserializer for Box<T> {
    fn deserialize(&self, data: &[u8], schema: &Arc<MessageSchema>) -> Result<Message> {
        (**self).deserialize(data, schema)
    }
}

/// Byte order of a CDR body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    Big,
    #[default]
    Little,
}

impl Endianness {
    fn header(self) -> [u8; HEADER_LEN] {
        match self {
            Endianness::Big => [0x00, 0x00, 0x00, 0x00],
            Endianness::Little => [0x00, 0x01, 0x00, 0x00],
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// CDR decoder; nested message types are looked up through `R`.
#[derive(Debug, Clone)]
pub struct CdrDeserializer<R> {
    resolver: R,
}

impl<R: SchemaResolver> CdrDeserializer<R> {
    pub fn new(resolver: R) -> Self {
        CdrDeserializer { resolver }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

impl<R: SchemaResolver> MessageDeserializer for CdrDeserializer<R> {
    fn deserialize(&self, data: &[u8], schema: &Arc<MessageSchema>) -> Result<Message> {
        let endian = match data {
            [0x00, 0x00, _, _, ..] => Endianness::Big,
            [0x00, 0x01, _, _, ..] => Endianness::Little,
            [a, b, _, _, ..] => {
                return Err(MsgError::Decode {
                    offset: 0,
                    reason: format!("unsupported encapsulation {a:#04x}{b:02x}"),
                })
            }
            _ => {
                return Err(MsgError::Decode {
                    offset: data.len(),
                    reason: "payload shorter than the encapsulation header".to_string(),
                })
            }
        };
        let mut reader = CdrReader {
            data: &data[HEADER_LEN..],
            pos: 0,
            endian,
            resolver: &self.resolver,
        };
        reader.message(schema, 0)
    }
}

struct CdrReader<'a, R> {
    data: &'a [u8],
    pos: usize,
    endian: Endianness,
    resolver: &'a R,
}

macro_rules! read_number {
    ($name:ident, $ty:ty) => {
        fn $name(&mut self) -> Result<$ty> {
            const N: usize = std::mem::size_of::<$ty>();
            self.align(N);
            let bytes = self.take_array::<N>()?;
            Ok(match self.endian {
                Endianness::Little => <$ty>::from_le_bytes(bytes),
                Endianness::Big => <$ty>::from_be_bytes(bytes),
            })
        }
    };
}

impl<'a, R: SchemaResolver> CdrReader<'a, R> {
    read_number!(read_u8, u8);
    read_number!(read_i8, i8);
    read_number!(read_u16, u16);
    read_number!(read_i16, i16);
    read_number!(read_u32, u32);
    read_number!(read_i32, i32);
    read_number!(read_u64, u64);
    read_number!(read_i64, i64);
    read_number!(read_f32, f32);
    read_number!(read_f64, f64);

    fn error(&self, reason: impl Into<String>) -> MsgError {
        MsgError::Decode {
            offset: self.pos + HEADER_LEN,
            reason: reason.into(),
        }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn align(&mut self, size: usize) {
        let padding = (size - self.pos % size) % size;
        self.pos += padding;
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.error(format!(
                "need {len} bytes, {} left",
                self.remaining()
            )));
        }
        let data: &'a [u8] = self.data;
        let slice = &data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Sequence or string length, checked against the bytes left.
    fn read_count(&mut self) -> Result<usize> {
        let count = self.read_u32()? as usize;
        if count > self.remaining() {
            return Err(self.error(format!(
                "length {count} exceeds the {} bytes left",
                self.remaining()
            )));
        }
        Ok(count)
    }

    fn message(&mut self, schema: &Arc<MessageSchema>, depth: usize) -> Result<Message> {
        if depth > MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {MAX_NESTING} in {}", schema.name())));
        }
        let values = schema
            .fields()
            .iter()
            .map(|spec| self.field(&spec.field_type, depth))
            .collect::<Result<Vec<_>>>()?;
        Message::new(Arc::clone(schema), values)
    }

    fn field(&mut self, field_type: &FieldType, depth: usize) -> Result<FieldValue> {
        match field_type {
            FieldType::Primitive(primitive) => self.primitive(*primitive),
            FieldType::Time => Ok(FieldValue::Time(self.stamp()?)),
            FieldType::Duration => Ok(FieldValue::Duration(self.stamp()?)),
            FieldType::Array { element, len } => {
                let count = match len {
                    ArrayLen::Fixed(n) => *n,
                    ArrayLen::Unbounded => self.read_count()?,
                    ArrayLen::Bounded(max) => {
                        let count = self.read_count()?;
                        if count > *max {
                            return Err(self.error(format!(
                                "sequence of {count} exceeds bound {max}"
                            )));
                        }
                        count
                    }
                };
                if field_type.is_byte_array() {
                    return Ok(FieldValue::Bytes(self.take(count)?.to_vec()));
                }
                let mut items = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    items.push(self.field(element, depth)?);
                }
                Ok(FieldValue::Array(items))
            }
            FieldType::Message(type_name) => {
                let schema = self.resolver.resolve_message(type_name)?;
                Ok(FieldValue::Message(self.message(&schema, depth + 1)?))
            }
        }
    }

    fn stamp(&mut self) -> Result<Stamp> {
        let sec = self.read_i32()?;
        let nanosec = self.read_u32()?;
        Ok(Stamp { sec, nanosec })
    }

    fn primitive(&mut self, primitive: PrimitiveType) -> Result<FieldValue> {
        let value = match primitive {
            PrimitiveType::Bool => match self.read_u8()? {
                0 => FieldValue::Bool(false),
                1 => FieldValue::Bool(true),
                other => return Err(self.error(format!("invalid bool byte {other}"))),
            },
            PrimitiveType::Byte => FieldValue::Byte(self.read_u8()?),
            PrimitiveType::Char => FieldValue::Char(self.read_u8()?),
            PrimitiveType::Int8 => FieldValue::Int8(self.read_i8()?),
            PrimitiveType::UInt8 => FieldValue::UInt8(self.read_u8()?),
            PrimitiveType::Int16 => FieldValue::Int16(self.read_i16()?),
            PrimitiveType::UInt16 => FieldValue::UInt16(self.read_u16()?),
            PrimitiveType::Int32 => FieldValue::Int32(self.read_i32()?),
            PrimitiveType::UInt32 => FieldValue::UInt32(self.read_u32()?),
            PrimitiveType::Int64 => FieldValue::Int64(self.read_i64()?),
            PrimitiveType::UInt64 => FieldValue::UInt64(self.read_u64()?),
            PrimitiveType::Float32 => FieldValue::Float32(self.read_f32()?),
            PrimitiveType::Float64 => FieldValue::Float64(self.read_f64()?),
            PrimitiveType::String => FieldValue::String(self.string()?),
        };
        Ok(value)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.read_count()?;
        let start = self.pos;
        let raw = self.take(len)?;
        let text = raw.strip_suffix(&[0]).unwrap_or(raw);
        std::str::from_utf8(text)
            .map(str::to_string)
            .map_err(|e| MsgError::Decode {
                offset: start + HEADER_LEN + e.valid_up_to(),
                reason: "string is not valid UTF-8".to_string(),
            })
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// CDR encoder. Little endian unless built with [`CdrSerializer::big_endian`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CdrSerializer {
    endian: Endianness,
}

impl CdrSerializer {
    pub fn new() -> Self {
        CdrSerializer::default()
    }

    pub fn big_endian() -> Self {
        CdrSerializer {
            endian: Endianness::Big,
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endian
    }

    /// Encode a message, header included.
    pub fn serialize(&self, message: &Message) -> Result<Vec<u8>> {
        let mut writer = CdrWriter {
            buf: self.endian.header().to_vec(),
            endian: self.endian,
        };
        writer.message(message)?;
        Ok(writer.buf)
    }
}

struct CdrWriter {
    buf: Vec<u8>,
    endian: Endianness,
}

macro_rules! write_number {
    ($name:ident, $ty:ty) => {
        fn $name(&mut self, value: $ty) {
            self.align(std::mem::size_of::<$ty>());
            match self.endian {
                Endianness::Little => self.buf.extend_from_slice(&value.to_le_bytes()),
                Endianness::Big => self.buf.extend_from_slice(&value.to_be_bytes()),
            }
        }
    };
}

impl CdrWriter {
    write_number!(write_u8, u8);
    write_number!(write_i8, i8);
    write_number!(write_u16, u16);
    write_number!(write_i16, i16);
    write_number!(write_u32, u32);
    write_number!(write_i32, i32);
    write_number!(write_u64, u64);
    write_number!(write_i64, i64);
    write_number!(write_f32, f32);
    write_number!(write_f64, f64);

    fn align(&mut self, size: usize) {
        while (self.buf.len() - HEADER_LEN) % size != 0 {
            self.buf.push(0);
        }
    }

    fn message(&mut self, message: &Message) -> Result<()> {
        for (spec, value) in message.fields() {
            self.field(&spec.name, &spec.field_type, value)?;
        }
        Ok(())
    }

    fn field(&mut self, name: &str, field_type: &FieldType, value: &FieldValue) -> Result<()> {
        match (field_type, value) {
            (FieldType::Primitive(primitive), value) => self.primitive(name, *primitive, value),
            (FieldType::Time, FieldValue::Time(stamp))
            | (FieldType::Duration, FieldValue::Duration(stamp)) => {
                self.write_i32(stamp.sec);
                self.write_u32(stamp.nanosec);
                Ok(())
            }
            (FieldType::Array { len, .. }, FieldValue::Bytes(bytes))
                if field_type.is_byte_array() =>
            {
                self.length(name, *len, bytes.len())?;
                self.buf.extend_from_slice(bytes);
                Ok(())
            }
            (FieldType::Array { element, len }, FieldValue::Array(items)) => {
                self.length(name, *len, items.len())?;
                for item in items {
                    self.field(name, element, item)?;
                }
                Ok(())
            }
            (FieldType::Message(_), FieldValue::Message(nested)) => self.message(nested),
            (_, other) => Err(mismatch(name, field_type, other)),
        }
    }

    fn length(&mut self, name: &str, len: ArrayLen, count: usize) -> Result<()> {
        if !len.admits(count) {
            return Err(MsgError::Encode {
                field: name.to_string(),
                reason: format!("{count} elements do not fit {len:?}"),
            });
        }
        if !matches!(len, ArrayLen::Fixed(_)) {
            self.write_u32(count_u32(name, count)?);
        }
        Ok(())
    }

    fn primitive(&mut self, name: &str, primitive: PrimitiveType, value: &FieldValue) -> Result<()> {
        match (primitive, value) {
            (PrimitiveType::Bool, FieldValue::Bool(v)) => self.write_u8(u8::from(*v)),
            (PrimitiveType::Byte, FieldValue::Byte(v))
            | (PrimitiveType::Char, FieldValue::Char(v))
            | (PrimitiveType::UInt8, FieldValue::UInt8(v)) => self.write_u8(*v),
            (PrimitiveType::Int8, FieldValue::Int8(v)) => self.write_i8(*v),
            (PrimitiveType::Int16, FieldValue::Int16(v)) => self.write_i16(*v),
            (PrimitiveType::UInt16, FieldValue::UInt16(v)) => self.write_u16(*v),
            (PrimitiveType::Int32, FieldValue::Int32(v)) => self.write_i32(*v),
            (PrimitiveType::UInt32, FieldValue::UInt32(v)) => self.write_u32(*v),
            (PrimitiveType::Int64, FieldValue::Int64(v)) => self.write_i64(*v),
            (PrimitiveType::UInt64, FieldValue::UInt64(v)) => self.write_u64(*v),
            (PrimitiveType::Float32, FieldValue::Float32(v)) => self.write_f32(*v),
            (PrimitiveType::Float64, FieldValue::Float64(v)) => self.write_f64(*v),
            (PrimitiveType::String, FieldValue::String(s)) => {
                self.write_u32(count_u32(name, s.len() + 1)?);
                self.buf.extend_from_slice(s.as_bytes());
                self.buf.push(0);
            }
            (_, other) => return Err(mismatch(name, &FieldType::Primitive(primitive), other)),
        }
        Ok(())
    }
}

fn count_u32(name: &str, count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| MsgError::Encode {
        field: name.to_string(),
        reason: format!("length {count} does not fit in u32"),
    })
}

fn mismatch(name: &str, field_type: &FieldType, value: &FieldValue) -> MsgError {
    MsgError::Encode {
        field: name.to_string(),
        reason: format!("{} value for declared type {field_type}", value.shape()),
    }
}
