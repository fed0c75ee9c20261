// Attribute normalization: arbitrary user values into protocol-safe primitives

use crate::constants::{ATTR_NULL_ARGS, MAX_INT_ATTRIBUTE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Protocol-safe attribute value.
///
/// Every key emitted downstream maps to exactly one of these primitive types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    StringArray(Vec<String>),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(v: Vec<String>) -> Self {
        AttributeValue::StringArray(v)
    }
}

/// An attribute value as supplied by the caller, before normalization.
///
/// `Int` is wider than the wire format on purpose: out-of-range magnitudes
/// are detected here and coerced to decimal strings instead of truncated.
#[derive(Debug, Clone, PartialEq)]
pub enum UserValue {
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    String(String),
    /// A structured value, serialized to a JSON string at encode time.
    Json(serde_json::Value),
}

impl UserValue {
    /// Renders the value for message-template bindings.
    pub fn render(&self) -> String {
        match self {
            UserValue::Null => "null".to_string(),
            UserValue::Bool(v) => v.to_string(),
            UserValue::Int(v) => v.to_string(),
            UserValue::Float(v) => v.to_string(),
            UserValue::String(s) => s.clone(),
            UserValue::Json(v) => json_dumps(v),
        }
    }
}

impl From<bool> for UserValue {
    fn from(v: bool) -> Self {
        UserValue::Bool(v)
    }
}

impl From<i32> for UserValue {
    fn from(v: i32) -> Self {
        UserValue::Int(v as i128)
    }
}

impl From<i64> for UserValue {
    fn from(v: i64) -> Self {
        UserValue::Int(v as i128)
    }
}

impl From<u64> for UserValue {
    fn from(v: u64) -> Self {
        UserValue::Int(v as i128)
    }
}

impl From<i128> for UserValue {
    fn from(v: i128) -> Self {
        UserValue::Int(v)
    }
}

impl From<f64> for UserValue {
    fn from(v: f64) -> Self {
        UserValue::Float(v)
    }
}

impl From<String> for UserValue {
    fn from(s: String) -> Self {
        UserValue::String(s)
    }
}

impl From<&str> for UserValue {
    fn from(s: &str) -> Self {
        UserValue::String(s.to_string())
    }
}

impl From<serde_json::Value> for UserValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => UserValue::Null,
            serde_json::Value::Bool(b) => UserValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    UserValue::Int(i as i128)
                } else if let Some(u) = n.as_u64() {
                    UserValue::Int(u as i128)
                } else {
                    UserValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => UserValue::String(s),
            other => UserValue::Json(other),
        }
    }
}

impl<T: Into<UserValue>> From<Option<T>> for UserValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => UserValue::Null,
        }
    }
}

/// Normalizes a user attribute map into protocol-safe primitives.
///
/// Null-valued keys are dropped from the primary map and collected into a
/// single reserved null-args attribute so the absence-vs-value distinction
/// survives. Integers beyond the signed 64-bit range become their exact
/// decimal string with a diagnostic warning. Structured values become JSON
/// strings. Encoding always succeeds.
pub fn encode(raw: &BTreeMap<String, UserValue>) -> BTreeMap<String, AttributeValue> {
    let mut prepared = BTreeMap::new();
    let mut null_args: Vec<String> = Vec::new();

    for (key, value) in raw {
        match encode_value(value) {
            Some(encoded) => {
                prepared.insert(key.clone(), encoded);
            }
            None => null_args.push(key.clone()),
        }
    }

    if !null_args.is_empty() {
        prepared.insert(ATTR_NULL_ARGS.to_string(), AttributeValue::StringArray(null_args));
    }

    prepared
}

/// Normalizes a single value. Returns `None` for null.
pub fn encode_value(value: &UserValue) -> Option<AttributeValue> {
    match value {
        UserValue::Null => None,
        UserValue::Bool(v) => Some(AttributeValue::Bool(*v)),
        UserValue::Int(v) => {
            if v.unsigned_abs() > MAX_INT_ATTRIBUTE as u128 {
                tracing::warn!(
                    value = %v,
                    "integer attribute exceeds the signed 64-bit wire range, sending as string"
                );
                Some(AttributeValue::String(v.to_string()))
            } else {
                Some(AttributeValue::Int(*v as i64))
            }
        }
        UserValue::Float(v) => Some(AttributeValue::Float(*v)),
        UserValue::String(s) => Some(AttributeValue::String(s.clone())),
        UserValue::Json(v) => Some(AttributeValue::String(json_dumps(v))),
    }
}

/// Serializes a structured value to JSON without ever failing.
///
/// A serialization failure degrades to the debug representation of the value
/// so the surrounding encode call still succeeds.
pub fn json_dumps(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

/// Builds a minimal JSON schema marking which keys carry JSON-encoded values.
///
/// Downstream consumers use this to know which string attributes should be
/// re-parsed as structured data. Returns `None` when no structured values are
/// present.
pub fn json_schema(raw: &BTreeMap<String, UserValue>) -> Option<String> {
    let mut properties = serde_json::Map::new();
    for (key, value) in raw {
        if let UserValue::Json(v) = value {
            let kind = if v.is_array() { "array" } else { "object" };
            properties.insert(
                key.clone(),
                serde_json::json!({ "type": kind }),
            );
        }
    }

    if properties.is_empty() {
        return None;
    }
    Some(json_dumps(&serde_json::json!({
        "type": "object",
        "properties": properties,
    })))
}
