//! Structured key/value fields attached to log entries.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// Key used by [`Field::error`].
pub const ERROR_KEY: &str = "error";

/// Typed value carried by a [`Field`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Duration(Duration),
}

impl Value {
    /// JSON representation used by structured encoders.
    ///
    /// Durations encode as fractional seconds. Non-finite floats encode as `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Uint(u) => serde_json::Value::from(*u),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Duration(d) => serde_json::Number::from_f64(d.as_secs_f64())
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
        }
    }

    /// Returns the inner string for `Value::String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Duration(d) => write!(f, "{d:?}"),
        }
    }
}

/// A single structured field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: Cow<'static, str>,
    pub value: Value,
}

impl Field {
    pub fn new(key: impl Into<Cow<'static, str>>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn string(key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Self::new(key, Value::String(value.into()))
    }

    pub fn int(key: impl Into<Cow<'static, str>>, value: i64) -> Self {
        Self::new(key, Value::Int(value))
    }

    pub fn uint(key: impl Into<Cow<'static, str>>, value: u64) -> Self {
        Self::new(key, Value::Uint(value))
    }

    pub fn float(key: impl Into<Cow<'static, str>>, value: f64) -> Self {
        Self::new(key, Value::Float(value))
    }

    pub fn bool(key: impl Into<Cow<'static, str>>, value: bool) -> Self {
        Self::new(key, Value::Bool(value))
    }

    pub fn duration(key: impl Into<Cow<'static, str>>, value: Duration) -> Self {
        Self::new(key, Value::Duration(value))
    }

    /// Field under the `error` key holding the error's display text.
    pub fn error(err: &(dyn std::error::Error + '_)) -> Self {
        Self::string(ERROR_KEY, err.to_string())
    }
}

/// Flattens fields into an ordered key/value list.
///
/// A key keeps the position of its first occurrence; its value is the one from the
/// last occurrence.
#[must_use]
pub fn flatten(fields: &[Field]) -> Vec<(&str, &Value)> {
    let mut out: Vec<(&str, &Value)> = Vec::with_capacity(fields.len());
    for field in fields {
        if let Some(pos) = out.iter().position(|(key, _)| *key == field.key) {
            out[pos].1 = &field.value;
        } else {
            out.push((&field.key, &field.value));
        }
    }
    out
}
