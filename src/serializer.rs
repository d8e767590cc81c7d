//! Pluggable conversion between rich [`Value`]s and their transportable form.
//!
//! A [`Handler`](crate::Handler) and a [`Client`](crate::Client) each own one
//! serializer. Both ends of a connection must agree on it.

use crate::types::{escape_token, format_datetime, parse_datetime, Value};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;

const DATE_TAG: &str = "Date";
const NUMBER_TAG: &str = "number";

pub trait Serializer: Send + Sync {
    fn serialize(&self, value: Value) -> Result<Value, SerializerError>;
    fn deserialize(&self, value: Value) -> Result<Value, SerializerError>;
}

pub type SharedSerializer = Arc<dyn Serializer>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SerializerError {
    #[error("unknown type tag {tag:?} at {path:?}")]
    UnknownTag { path: String, tag: String },

    #[error("cannot restore {tag} at {path:?}: {reason}")]
    Restore {
        path: String,
        tag: &'static str,
        reason: String,
    },

    #[error("malformed meta: {0}")]
    MalformedMeta(String),

    #[error("{0}")]
    Custom(String),
}

/// The default serializer.
///
/// Output is `{"json": <plain>, "meta": {"values": {<pointer>: <tag>}}}` where
/// `<plain>` only holds JSON-representable values and each annotation names a
/// value that was rewritten to text. `meta` is left out when nothing was
/// rewritten, so `"pong"` serializes to `{"json": "pong"}`.
///
/// Deserializing something that does not look like that envelope returns it
/// unchanged, which lets plain JSON callers talk to a tagged endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedJson;

impl Serializer for TaggedJson {
    fn serialize(&self, value: Value) -> Result<Value, SerializerError> {
        let mut annotations = BTreeMap::new();
        let json = flatten(value, "", &mut annotations);

        let mut envelope = BTreeMap::new();
        envelope.insert("json".to_owned(), json);
        if !annotations.is_empty() {
            let mut meta = BTreeMap::new();
            meta.insert("values".to_owned(), Value::Map(annotations));
            envelope.insert("meta".to_owned(), Value::Map(meta));
        }
        Ok(Value::Map(envelope))
    }

    fn deserialize(&self, value: Value) -> Result<Value, SerializerError> {
        let mut envelope = match value {
            Value::Map(map) if is_envelope(&map) => map,
            other => return Ok(other),
        };
        let mut json = envelope.remove("json").unwrap_or(Value::Null);

        let annotations = match envelope.remove("meta") {
            None | Some(Value::Null) => return Ok(json),
            Some(Value::Map(mut meta)) => match meta.remove("values") {
                None | Some(Value::Null) => return Ok(json),
                Some(Value::Map(annotations)) => annotations,
                Some(other) => {
                    return Err(SerializerError::MalformedMeta(format!(
                        "values must be a Map, found {}",
                        other.rpc_type()
                    )))
                }
            },
            Some(other) => {
                return Err(SerializerError::MalformedMeta(format!(
                    "meta must be a Map, found {}",
                    other.rpc_type()
                )))
            }
        };

        for (path, tag) in annotations {
            let Value::String(tag) = tag else {
                return Err(SerializerError::MalformedMeta(format!(
                    "tag at {path:?} must be a String"
                )));
            };
            let slot = json.pointer_mut(&path).ok_or_else(|| {
                SerializerError::MalformedMeta(format!("no value at {path:?}"))
            })?;
            let plain = std::mem::replace(slot, Value::Null);
            *slot = restore(&path, &tag, plain)?;
        }
        Ok(json)
    }
}

fn is_envelope(map: &BTreeMap<String, Value>) -> bool {
    map.contains_key("json") && map.keys().all(|k| k == "json" || k == "meta")
}

fn flatten(value: Value, path: &str, annotations: &mut BTreeMap<String, Value>) -> Value {
    match value {
        Value::DateTime(dt) => {
            annotations.insert(path.to_owned(), Value::from(DATE_TAG));
            Value::String(format_datetime(&dt))
        }
        Value::Float(n) if !n.is_finite() => {
            annotations.insert(path.to_owned(), Value::from(NUMBER_TAG));
            Value::from(non_finite_name(n))
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| flatten(item, &format!("{path}/{i}"), annotations))
                .collect(),
        ),
        Value::Map(map) => Value::Map(
            map.into_iter()
                .map(|(key, item)| {
                    let child = format!("{path}/{}", escape_token(&key));
                    (key, flatten(item, &child, annotations))
                })
                .collect(),
        ),
        plain => plain,
    }
}

fn non_finite_name(n: f64) -> &'static str {
    if n.is_nan() {
        "NaN"
    } else if n > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn restore(path: &str, tag: &str, plain: Value) -> Result<Value, SerializerError> {
    let restore_error = |tag: &'static str, reason: String| SerializerError::Restore {
        path: path.to_owned(),
        tag,
        reason,
    };
    match (tag, plain) {
        (DATE_TAG, Value::String(s)) => parse_datetime(&s)
            .map(Value::DateTime)
            .map_err(|e| restore_error(DATE_TAG, e.to_string())),
        (NUMBER_TAG, Value::String(s)) => match s.as_str() {
            "NaN" => Ok(Value::Float(f64::NAN)),
            "Infinity" => Ok(Value::Float(f64::INFINITY)),
            "-Infinity" => Ok(Value::Float(f64::NEG_INFINITY)),
            _ => Err(restore_error(NUMBER_TAG, format!("unexpected {s:?}"))),
        },
        (DATE_TAG, other) => Err(restore_error(
            DATE_TAG,
            format!("expected String, found {}", other.rpc_type()),
        )),
        (NUMBER_TAG, other) => Err(restore_error(
            NUMBER_TAG,
            format!("expected String, found {}", other.rpc_type()),
        )),
        (unknown, _) => Err(SerializerError::UnknownTag {
            path: path.to_owned(),
            tag: unknown.to_owned(),
        }),
    }
}

/// Identity serializer for trusted in-process transports, where values never
/// leave the process and so never lose fidelity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Serializer for Passthrough {
    fn serialize(&self, value: Value) -> Result<Value, SerializerError> {
        Ok(value)
    }

    fn deserialize(&self, value: Value) -> Result<Value, SerializerError> {
        Ok(value)
    }
}

pub struct FnSerializer<S, D> {
    serialize: S,
    deserialize: D,
}

/// Builds a serializer out of a pair of functions.
pub fn from_fn<S, D>(serialize: S, deserialize: D) -> FnSerializer<S, D>
where
    S: Fn(Value) -> Result<Value, SerializerError> + Send + Sync,
    D: Fn(Value) -> Result<Value, SerializerError> + Send + Sync,
{
    FnSerializer {
        serialize,
        deserialize,
    }
}

impl<S, D> Serializer for FnSerializer<S, D>
where
    S: Fn(Value) -> Result<Value, SerializerError> + Send + Sync,
    D: Fn(Value) -> Result<Value, SerializerError> + Send + Sync,
{
    fn serialize(&self, value: Value) -> Result<Value, SerializerError> {
        (self.serialize)(value)
    }

    fn deserialize(&self, value: Value) -> Result<Value, SerializerError> {
        (self.deserialize)(value)
    }
}
