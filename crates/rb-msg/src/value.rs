//! Plain dictionary values.
//!
//! [`Value`] is the untyped side of the converter: the nested mapping a
//! message turns into, and the mapping callers hand back to build one.
//! Besides the host-level `Int`/`Float` categories it carries fixed-width
//! numeric kinds so the per-type allow-lists can tell a 32-bit integer from
//! an arbitrary one.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One dictionary value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Host integer.
    Int(i64),
    /// Host float.
    Float(f64),
    Str(String),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    List(Vec<Value>),
    Dict(Dict),
}

/// Host-level category of a [`Value`], as checked by the type allow-lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    None,
    Bool,
    Int,
    Float,
    Str,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    List,
    Dict,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::I8 => "int8",
            ValueKind::I16 => "int16",
            ValueKind::I32 => "int32",
            ValueKind::I64 => "int64",
            ValueKind::U8 => "uint8",
            ValueKind::U16 => "uint16",
            ValueKind::U32 => "uint32",
            ValueKind::U64 => "uint64",
            ValueKind::F32 => "float32",
            ValueKind::F64 => "float64",
            ValueKind::List => "list",
            ValueKind::Dict => "dict",
        };
        write!(f, "{name}")
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::None,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::I8(_) => ValueKind::I8,
            Value::I16(_) => ValueKind::I16,
            Value::I32(_) => ValueKind::I32,
            Value::I64(_) => ValueKind::I64,
            Value::U8(_) => ValueKind::U8,
            Value::U16(_) => ValueKind::U16,
            Value::U32(_) => ValueKind::U32,
            Value::U64(_) => ValueKind::U64,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
            Value::List(_) => ValueKind::List,
            Value::Dict(_) => ValueKind::Dict,
        }
    }

    /// Anything but a list or a dict.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Dict(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer kinds widened losslessly; floats and bools are not integers.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(v) | Value::I64(v) => Some(i128::from(*v)),
            Value::I8(v) => Some(i128::from(*v)),
            Value::I16(v) => Some(i128::from(*v)),
            Value::I32(v) => Some(i128::from(*v)),
            Value::U8(v) => Some(i128::from(*v)),
            Value::U16(v) => Some(i128::from(*v)),
            Value::U32(v) => Some(i128::from(*v)),
            Value::U64(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    /// Any numeric kind as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) | Value::F64(v) => Some(*v),
            Value::F32(v) => Some(f64::from(*v)),
            Value::Int(v) | Value::I64(v) => Some(*v as f64),
            Value::U64(v) => Some(*v as f64),
            other => other.as_i128().map(|v| v as f64),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) | Value::I64(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::Float(v) | Value::F64(v) => write!(f, "{v:?}"),
            Value::F32(v) => write!(f, "{v:?}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Dict(dict) => {
                write!(f, "{{")?;
                for (i, (key, value)) in dict.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Dict> for Value {
    fn from(v: Dict) -> Self {
        Value::Dict(v)
    }
}

/// Insertion-ordered string-keyed mapping.
///
/// Keys are indexed, so lookups and inserts stay constant-time while
/// iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Dict {
    pub fn new() -> Self {
        Dict::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Dict {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Insert or replace; a replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&slot) => Some(std::mem::replace(&mut self.entries[slot].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Remove a key; later entries shift down one slot.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let slot = self.index.remove(key)?;
        let (_, value) = self.entries.remove(slot);
        for (k, _) in &self.entries[slot..] {
            if let Some(position) = self.index.get_mut(k) {
                *position -= 1;
            }
        }
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl IntoIterator for Dict {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Dict {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Dict::new();
        dict.extend(iter);
        dict
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Dict {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(v) | Value::I64(v) => serializer.serialize_i64(*v),
            Value::I8(v) => serializer.serialize_i8(*v),
            Value::I16(v) => serializer.serialize_i16(*v),
            Value::I32(v) => serializer.serialize_i32(*v),
            Value::U8(v) => serializer.serialize_u8(*v),
            Value::U16(v) => serializer.serialize_u16(*v),
            Value::U32(v) => serializer.serialize_u32(*v),
            Value::U64(v) => serializer.serialize_u64(*v),
            Value::Float(v) | Value::F64(v) => serializer.serialize_f64(*v),
            Value::F32(v) => serializer.serialize_f32(*v),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(dict) => dict.serialize(serializer),
        }
    }
}

impl Serialize for Dict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON-like value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(i64::try_from(v).map_or(Value::U64(v), Value::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Str(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Value, A::Error> {
        DictVisitor.visit_map(map).map(Value::Dict)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct DictVisitor;

impl<'de> Visitor<'de> for DictVisitor {
    type Value = Dict;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string-keyed map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Dict, A::Error> {
        let mut dict = Dict::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            dict.insert(key, value);
        }
        Ok(dict)
    }
}

impl<'de> Deserialize<'de> for Dict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DictVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict_preserves_insertion_order() {
        let mut dict = Dict::new();
        dict.insert("z", 1);
        dict.insert("a", 2);
        dict.insert("m", 3);
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);

        // Replacing keeps the slot.
        assert_eq!(dict.insert("z", 9), Some(Value::Int(1)));
        assert_eq!(dict.keys().next(), Some("z"));
        assert_eq!(dict.get("z"), Some(&Value::Int(9)));
    }

    #[test]
    fn test_remove_keeps_lookups_in_step() {
        let mut dict: Dict = [("a", 1), ("b", 2), ("c", 3), ("d", 4)].into_iter().collect();
        assert_eq!(dict.remove("b"), Some(Value::Int(2)));
        assert_eq!(dict.remove("b"), None);
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["a", "c", "d"]);
        assert_eq!(dict.get("c"), Some(&Value::Int(3)));
        assert_eq!(dict.get("d"), Some(&Value::Int(4)));

        dict.insert("d", 40);
        dict.insert("b", 20);
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["a", "c", "d", "b"]);
        assert_eq!(dict.get("d"), Some(&Value::Int(40)));
        assert_eq!(dict.get("b"), Some(&Value::Int(20)));
        assert!(!dict.contains_key("z"));
    }

    #[test]
    fn test_equality_ignores_how_dict_was_built() {
        let mut built = Dict::with_capacity(8);
        built.insert("x", 1);
        built.insert("gone", 0);
        built.insert("y", 2);
        built.remove("gone");
        let collected: Dict = [("x", 1), ("y", 2)].into_iter().collect();
        assert_eq!(built, collected);

        let reordered: Dict = [("y", 2), ("x", 1)].into_iter().collect();
        assert_ne!(built, reordered);
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(Value::Int(1).kind(), ValueKind::Int);
        assert_eq!(Value::F32(1.0).kind(), ValueKind::F32);
        assert_eq!(Value::Str("x".into()).kind(), ValueKind::Str);
        assert_eq!(ValueKind::U16.to_string(), "uint16");
        assert_eq!(ValueKind::None.to_string(), "none");
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::U64(u64::MAX).as_i128(), Some(i128::from(u64::MAX)));
        assert_eq!(Value::Float(1.5).as_i128(), None);
        assert_eq!(Value::Bool(true).as_i128(), None);
        assert_eq!(Value::I16(-3).as_f64(), Some(-3.0));
        assert_eq!(Value::Str("1".into()).as_f64(), None);
    }

    #[test]
    fn test_json_roundtrip_keeps_key_order() {
        let json = r#"{"b": 1, "a": [true, null, 2.5], "c": {"y": "s", "x": 18446744073709551615}}"#;
        let value: Value = serde_json::from_str(json).unwrap();
        let dict = value.as_dict().unwrap();
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(
            dict.get("a"),
            Some(&Value::List(vec![
                Value::Bool(true),
                Value::Null,
                Value::Float(2.5)
            ]))
        );
        let inner = dict.get("c").and_then(Value::as_dict).unwrap();
        assert_eq!(inner.keys().collect::<Vec<_>>(), vec!["y", "x"]);
        assert_eq!(inner.get("x"), Some(&Value::U64(u64::MAX)));

        let back = serde_json::to_string(&value).unwrap();
        assert!(back.starts_with(r#"{"b":1,"a":"#));
    }

    #[test]
    fn test_display() {
        let dict: Dict = [("a", Value::Int(1)), ("b", Value::List(vec![Value::Null]))]
            .into_iter()
            .collect();
        assert_eq!(Value::Dict(dict).to_string(), "{a: 1, b: [None]}");
    }
}
