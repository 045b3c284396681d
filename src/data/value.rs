use std::fmt;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// A single stored cell, as the column store hands it back before any
/// modality-specific loading.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(ArrayD<f64>),
}

/// The physical kind of values a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Bool,
    Int,
    Float,
    Text,
    Array,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Array => "array",
        };
        write!(f, "{name}")
    }
}

impl StorageKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Float)
    }

    /// The kind both `self` and `other` fit in. Ints widen to floats; any other
    /// mix has no common kind.
    pub fn unify(self, other: Self) -> Option<Self> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Self::Int, Self::Float) | (Self::Float, Self::Int) => Some(Self::Float),
            _ => None,
        }
    }
}

impl Value {
    /// `None` for nulls, which fit in a column of any kind.
    pub fn kind(&self) -> Option<StorageKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(StorageKind::Bool),
            Self::Int(_) => Some(StorageKind::Int),
            Self::Float(_) => Some(StorageKind::Float),
            Self::Text(_) => Some(StorageKind::Text),
            Self::Array(_) => Some(StorageKind::Array),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(i) => Some(*i as f64),
            Self::Bool(b) => Some(if *b { 1. } else { 0. }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// JSON form of a scalar value. Arrays have none. Non-finite floats, which
    /// JSON cannot carry as numbers, become the strings `NaN`, `Infinity` and
    /// `-Infinity`; [`Value::from_json_as`] reads them back in float columns.
    pub(crate) fn to_json(&self) -> Option<JsonValue> {
        match self {
            Self::Null => Some(JsonValue::Null),
            Self::Bool(b) => Some(JsonValue::Bool(*b)),
            Self::Int(i) => Some(JsonValue::from(*i)),
            Self::Float(v) => Some(match serde_json::Number::from_f64(*v) {
                Some(n) => JsonValue::Number(n),
                None if v.is_nan() => JsonValue::String(NAN.to_string()),
                None if *v > 0. => JsonValue::String(INFINITY.to_string()),
                None => JsonValue::String(NEG_INFINITY.to_string()),
            }),
            Self::Text(s) => Some(JsonValue::String(s.clone())),
            Self::Array(_) => None,
        }
    }

    pub(crate) fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::Text(n.to_string())
                }
            }
            JsonValue::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Like [`Value::from_json`], but in a column of `kind` float the strings
    /// written for non-finite floats are read back as floats.
    pub(crate) fn from_json_as(value: &JsonValue, kind: Option<StorageKind>) -> Self {
        match (kind, value) {
            (Some(StorageKind::Float), JsonValue::String(s)) => match s.as_str() {
                NAN => Self::Float(f64::NAN),
                INFINITY => Self::Float(f64::INFINITY),
                NEG_INFINITY => Self::Float(f64::NEG_INFINITY),
                _ => Self::Text(s.clone()),
            },
            _ => Self::from_json(value),
        }
    }

    /// Best-effort typing of a text cell, e.g. from a CSV file.
    pub(crate) fn guess(s: &str) -> Self {
        if s.is_empty() {
            return Self::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Self::Float(f);
        }
        match s {
            "true" | "True" => Self::Bool(true),
            "false" | "False" => Self::Bool(false),
            _ => Self::Text(s.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Null => write!(f, "<null>"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Array(a) => write!(f, "<array {:?}>", a.shape()),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<ArrayD<f64>> for Value {
    fn from(v: ArrayD<f64>) -> Self {
        Self::Array(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guessing() {
        assert_eq!(Value::guess(""), Value::Null);
        assert_eq!(Value::guess("42"), Value::Int(42));
        assert_eq!(Value::guess("-1.5"), Value::Float(-1.5));
        assert_eq!(Value::guess("True"), Value::Bool(true));
        assert_eq!(Value::guess("CCO"), Value::Text("CCO".into()));
    }

    #[test]
    fn json_keeps_ints_and_floats_apart() {
        for value in [Value::Int(3), Value::Float(3.0), Value::Float(-0.25), Value::Text("x".into()), Value::Null] {
            let json = value.to_json().unwrap();
            assert_eq!(Value::from_json(&json), value);
        }
        assert!(Value::Array(ArrayD::zeros(vec![2])).to_json().is_none());
    }

    #[test]
    fn non_finite_floats_survive_json() {
        let float = Some(StorageKind::Float);
        for v in [f64::INFINITY, f64::NEG_INFINITY] {
            let json = Value::Float(v).to_json().unwrap();
            assert!(json.is_string(), "{json}");
            assert_eq!(Value::from_json_as(&json, float), Value::Float(v));
        }

        let json = Value::Float(f64::NAN).to_json().unwrap();
        assert_eq!(json, JsonValue::String("NaN".into()));
        assert!(Value::from_json_as(&json, float).as_f64().unwrap().is_nan());

        // Text columns keep the words as text.
        assert_eq!(Value::from_json_as(&json, Some(StorageKind::Text)), Value::Text("NaN".into()));
        assert_eq!(Value::from_json_as(&json, None), Value::Text("NaN".into()));
        assert_eq!(Value::from_json_as(&JsonValue::from(2), float), Value::Int(2));
    }

    #[test]
    fn kinds_unify() {
        assert_eq!(StorageKind::Int.unify(StorageKind::Float), Some(StorageKind::Float));
        assert_eq!(StorageKind::Text.unify(StorageKind::Text), Some(StorageKind::Text));
        assert_eq!(StorageKind::Text.unify(StorageKind::Float), None);
    }
}
