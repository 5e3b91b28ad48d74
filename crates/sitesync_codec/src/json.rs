//! Conversion between [`Value`] and JSON.
//!
//! Payloads arrive from the UI and leave towards the remote API as JSON.
//! The mapping is lossless for everything JSON can express; byte strings,
//! non-text map keys and infinities have no JSON form and are refused.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde_json::{Map, Number};

/// Convert a JSON document into a [`Value`].
///
/// JSON numbers that fit `i64` become [`Value::Integer`]; every other number
/// becomes [`Value::Float`].
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => Value::Array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(fields) => {
            Value::object(fields.iter().map(|(k, v)| (k.clone(), from_json(v))))
        }
    }
}

/// Convert a [`Value`] into a JSON document.
///
/// # Errors
///
/// Returns [`CodecError::NotJson`] for byte strings, non-text map keys and
/// non-finite floats.
pub fn to_json(value: &Value) -> CodecResult<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => serde_json::Value::Number(Number::from(*n)),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| CodecError::not_json(format!("non-finite float {f}")))?,
        Value::Bytes(_) => return Err(CodecError::not_json("byte string")),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<CodecResult<_>>()?)
        }
        Value::Map(pairs) => {
            let mut object = Map::with_capacity(pairs.len());
            for (key, field) in pairs {
                let name = key.as_text().ok_or_else(|| {
                    CodecError::not_json(format!("{} map key", key.type_name()))
                })?;
                object.insert(name.to_owned(), to_json(field)?);
            }
            serde_json::Value::Object(object)
        }
    })
}
