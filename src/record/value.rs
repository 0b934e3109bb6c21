//! Scalar values and the single numeric coercion rule
//!
//! Raw text is the canonical form for equality and text ordering. Numeric
//! interpretation is attempted on demand through `try_coerce_number`, which is
//! shared by the condition evaluator, the sort engine and the aggregator.

use std::borrow::Cow;
use std::fmt;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::errors::{EngineError, EngineResult};

/// Marker written into cells of columns a record never had
pub const UNSET_MARKER: &str = "NA";

/// A tagged scalar cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(serde_json::Number),
    Boolean(bool),
    Null,
}

impl Value {
    /// The unset marker used to back-fill new columns
    pub fn unset() -> Self {
        Value::String(UNSET_MARKER.to_string())
    }

    /// Builds a number value; non-finite inputs have no JSON representation
    /// and become `Null`.
    pub fn number(n: f64) -> Self {
        match serde_json::Number::from_f64(n) {
            Some(num) => Value::Number(num),
            None => Value::Null,
        }
    }

    /// Builds an integer number value
    pub fn integer(n: u64) -> Self {
        Value::Number(serde_json::Number::from(n))
    }

    /// Raw textual form used for eq/ne, contains, and text ordering
    pub fn raw_text(&self) -> Cow<'_, str> {
        match self {
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Number(n) => Cow::Owned(n.to_string()),
            Value::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Null => Cow::Borrowed("null"),
        }
    }

    /// Returns the string slice if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if this cell holds the unset marker
    pub fn is_unset(&self) -> bool {
        matches!(self, Value::String(s) if s == UNSET_MARKER)
    }

    /// Converts a decoded JSON scalar. Arrays and objects are rejected.
    pub fn from_json(value: serde_json::Value) -> EngineResult<Self> {
        match value {
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Number(n) => Ok(Value::Number(n)),
            serde_json::Value::Bool(b) => Ok(Value::Boolean(b)),
            serde_json::Value::Null => Ok(Value::Null),
            other => Err(EngineError::invalid_format(
                "Nested arrays and objects are not supported as cell values",
            )
            .with_details(format!("value: {}", other))),
        }
    }

    /// Converts to a JSON scalar
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(serde_json::Number::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Number(n) => n.serialize(serializer),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Null => serializer.serialize_unit(),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(json).map_err(de::Error::custom)
    }
}

/// Attempts to read a value as a finite number.
///
/// Strings are trimmed and parsed in full; partial numeric prefixes,
/// booleans, nulls and non-finite results all fail.
pub fn try_coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Boolean(_) | Value::Null => return None,
    };
    if n.is_finite() {
        Some(n)
    } else {
        None
    }
}

/// `try_coerce_number` with the failure surfaced as `TypeCoercion`
pub fn coerce_number(value: &Value, context: &str) -> EngineResult<f64> {
    try_coerce_number(value).ok_or_else(|| EngineError::type_coercion(&value.raw_text(), context))
}
