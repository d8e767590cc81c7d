use chrono::{DateTime, SecondsFormat, Utc};
use serde::{
    de::{self, DeserializeOwned, MapAccess, SeqAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use std::{collections::BTreeMap, fmt};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Null,
    Bool,
    Int,
    Float,
    String,
    DateTime,
    Array,
    Map,
}

impl Type {
    fn name(&self) -> &'static str {
        use Type::*;
        match self {
            Null => "Null",
            Bool => "Bool",
            Int => "Int",
            Float => "Float",
            String => "String",
            DateTime => "DateTime",
            Array => "Array",
            Map => "Map",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed value carried by params and results.
///
/// The domain is a superset of what JSON can express: [`Value::DateTime`] and
/// non-finite [`Value::Float`]s have no native JSON form, which is what the
/// [`TaggedJson`](crate::serializer::TaggedJson) serializer exists for.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn rpc_type(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::String(_) => Type::String,
            Value::DateTime(_) => Type::DateTime,
            Value::Array(_) => Type::Array,
            Value::Map(_) => Type::Map,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key when `self` is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Looks up a value by RFC 6901 JSON pointer (`""` is the value itself).
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        if pointer.is_empty() {
            return Some(self);
        }
        if !pointer.starts_with('/') {
            return None;
        }
        pointer
            .split('/')
            .skip(1)
            .map(unescape_token)
            .try_fold(self, |target, token| match target {
                Value::Map(map) => map.get(&token),
                Value::Array(items) => parse_index(&token).and_then(|i| items.get(i)),
                _ => None,
            })
    }

    pub fn pointer_mut(&mut self, pointer: &str) -> Option<&mut Value> {
        if pointer.is_empty() {
            return Some(self);
        }
        if !pointer.starts_with('/') {
            return None;
        }
        pointer
            .split('/')
            .skip(1)
            .map(unescape_token)
            .try_fold(self, |target, token| match target {
                Value::Map(map) => map.get_mut(&token),
                Value::Array(items) => parse_index(&token).and_then(move |i| items.get_mut(i)),
                _ => None,
            })
    }
}

/// Escapes one reference token of a JSON pointer.
pub(crate) fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn parse_index(token: &str) -> Option<usize> {
    if token.starts_with('+') || (token.starts_with('0') && token.len() != 1) {
        return None;
    }
    token.parse().ok()
}

// NaN compares equal to NaN so that round-tripped values can be checked with ==
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (String(a), String(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            _ => false,
        }
    }
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    let format = if dt.timestamp_subsec_nanos() % 1_000_000 == 0 {
        SecondsFormat::Millis
    } else {
        SecondsFormat::AutoSi
    };
    dt.to_rfc3339_opts(format, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, ValueError> {
    // `FromStr` also takes the signed extended years `format_datetime` writes
    // outside 0000..=9999, which `parse_from_rfc3339` rejects.
    s.parse::<DateTime<Utc>>()
        .map_err(|_| ValueError::InvalidDateTime(s.to_owned()))
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Plain JSON rendering. Dates become RFC 3339 strings and non-finite floats
/// become `null` in JSON output, so this alone is lossy.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::DateTime(dt) => serializer.serialize_str(&format_datetime(dt)),
            Value::Array(items) => serializer.collect_seq(items),
            Value::Map(map) => serializer.collect_map(map),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Deserialize::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Value, E> {
        Ok(Value::Int(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Value, E> {
        Ok(i64::try_from(n).map_or(Value::Float(n as f64), Value::Int))
    }

    fn visit_f64<E: de::Error>(self, n: f64) -> Result<Value, E> {
        Ok(Value::Float(n))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::String(s.to_owned()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch { expected: Type, found: Type },

    #[error("{value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("invalid datetime {0:?}")]
    InvalidDateTime(String),

    #[error("json conversion: {0}")]
    Json(String),
}

impl ValueError {
    fn mismatch(expected: Type, found: &Value) -> Self {
        Self::Mismatch {
            expected,
            found: found.rpc_type(),
        }
    }
}

/// Conversion of a Rust value into a [`Value`].
pub trait Encode {
    fn encode(self) -> Result<Value, ValueError>;
}

/// Conversion of a [`Value`] back into a Rust value.
pub trait Decode: Sized {
    fn decode(value: Value) -> Result<Self, ValueError>;
}

macro_rules! impl_encode_decode {
    ($rust_type:ty, $rpc_type:expr, $encode_name:pat => $encode_expr:expr, $($decode_arm:tt)*) => {
        impl Encode for $rust_type {
            fn encode(self) -> Result<Value, ValueError> {
                let $encode_name = self;
                Ok($encode_expr)
            }
        }

        impl Decode for $rust_type {
            fn decode(value: Value) -> Result<Self, ValueError> {
                Ok(match value {
                    $($decode_arm)*,
                    other => return Err(ValueError::mismatch($rpc_type, &other)),
                })
            }
        }
    };
}

impl_encode_decode!((), Type::Null, () => Value::Null, Value::Null => ());
impl_encode_decode!(bool, Type::Bool, b => Value::Bool(b), Value::Bool(b) => b);
impl_encode_decode!(i64, Type::Int, n => Value::Int(n), Value::Int(n) => n);
impl_encode_decode!(String, Type::String, s => Value::String(s), Value::String(s) => s);
impl_encode_decode!(
    f64, Type::Float, n => Value::Float(n),
    Value::Float(n) => n,
    Value::Int(n) => n as f64
);

macro_rules! impl_integer {
    ($($int:ty),*) => {
        $(
            impl Encode for $int {
                fn encode(self) -> Result<Value, ValueError> {
                    i64::try_from(self).map(Value::Int).map_err(|_| ValueError::OutOfRange {
                        value: self.to_string(),
                        target: "Int",
                    })
                }
            }

            impl Decode for $int {
                fn decode(value: Value) -> Result<Self, ValueError> {
                    match value {
                        Value::Int(n) => <$int>::try_from(n).map_err(|_| ValueError::OutOfRange {
                            value: n.to_string(),
                            target: stringify!($int),
                        }),
                        other => Err(ValueError::mismatch(Type::Int, &other)),
                    }
                }
            }
        )*
    };
}

impl_integer!(i8, i16, i32, isize, u8, u16, u32, u64, usize);

impl Encode for &str {
    fn encode(self) -> Result<Value, ValueError> {
        Ok(Value::String(self.to_owned()))
    }
}

impl Encode for Value {
    fn encode(self) -> Result<Value, ValueError> {
        Ok(self)
    }
}

impl Decode for Value {
    fn decode(value: Value) -> Result<Self, ValueError> {
        Ok(value)
    }
}

impl Encode for DateTime<Utc> {
    fn encode(self) -> Result<Value, ValueError> {
        Ok(Value::DateTime(self))
    }
}

impl Decode for DateTime<Utc> {
    fn decode(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            // plain JSON transports carry dates as text
            Value::String(s) => parse_datetime(&s),
            other => Err(ValueError::mismatch(Type::DateTime, &other)),
        }
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(self) -> Result<Value, ValueError> {
        match self {
            Some(inner) => inner.encode(),
            None => Ok(Value::Null),
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::decode(other).map(Some),
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(self) -> Result<Value, ValueError> {
        self.into_iter()
            .map(Encode::encode)
            .collect::<Result<_, _>>()
            .map(Value::Array)
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Array(items) => items.into_iter().map(T::decode).collect(),
            other => Err(ValueError::mismatch(Type::Array, &other)),
        }
    }
}

impl<T: Encode> Encode for BTreeMap<String, T> {
    fn encode(self) -> Result<Value, ValueError> {
        self.into_iter()
            .map(|(k, v)| Ok((k, v.encode()?)))
            .collect::<Result<_, _>>()
            .map(Value::Map)
    }
}

impl<T: Decode> Decode for BTreeMap<String, T> {
    fn decode(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Map(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, T::decode(v)?)))
                .collect(),
            other => Err(ValueError::mismatch(Type::Map, &other)),
        }
    }
}

/// Bridges any serde type through its plain JSON form.
///
/// Struct fields of type `DateTime<Utc>` survive the trip because chrono
/// reads them back from the RFC 3339 text that [`Value`] renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> Encode for Json<T> {
    fn encode(self) -> Result<Value, ValueError> {
        serde_json::to_value(&self.0)
            .map(Value::from)
            .map_err(|e| ValueError::Json(e.to_string()))
    }
}

impl<T: DeserializeOwned> Decode for Json<T> {
    fn decode(value: Value) -> Result<Self, ValueError> {
        let json = serde_json::to_value(&value).map_err(|e| ValueError::Json(e.to_string()))?;
        serde_json::from_value(json)
            .map(Json)
            .map_err(|e| ValueError::Json(e.to_string()))
    }
}
