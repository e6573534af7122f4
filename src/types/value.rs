//! Field and cell values
//!
//! `Value` is the single currency for document field values, view row cells and
//! logic expression operands. `ValueClass` is the declared type of a field and
//! decides which values a field accepts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{Result, StateError};

/// A value that can be stored in a document field or a view row cell
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    Date(NaiveDate),
    Text(String),
    Lookup { key: String, display: String },
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn lookup(key: impl Into<String>, display: impl Into<String>) -> Self {
        Value::Lookup {
            key: key.into(),
            display: display.into(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, empty text and lookups with an empty key count as "no value"
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::Lookup { key, .. } => key.is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Truthiness used by logic expressions: `true`, `"Y"`, or a non-zero number
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => s == "Y" || s.eq_ignore_ascii_case("true"),
            Value::Lookup { key, .. } => !key.is_empty(),
            Value::Null | Value::Date(_) => false,
        }
    }

    /// String form used when comparing against quoted logic operands
    pub fn as_comparable_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(true) => "Y".to_string(),
            Value::Bool(false) => "N".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Text(s) => s.clone(),
            Value::Lookup { key, .. } => key.clone(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Number(_) => 2,
            Value::Date(_) => 3,
            Value::Text(_) => 4,
            Value::Lookup { .. } => 5,
        }
    }

    /// Total order used for in-memory sorting. Nulls sort first.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (
                Value::Lookup {
                    key: ka,
                    display: da,
                },
                Value::Lookup {
                    key: kb,
                    display: db,
                },
            ) => da.cmp(db).then_with(|| ka.cmp(kb)),
            (a, b) if a.rank() == 2 && b.rank() == 2 => {
                let x = a.as_f64().unwrap_or_default();
                let y = b.as_f64().unwrap_or_default();
                x.total_cmp(&y)
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Lookup { key, display } => write!(f, "{}:{}", key, display),
            other => f.write_str(&other.as_comparable_text()),
        }
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

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// The declared value type of a field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueClass {
    Text,
    Integer,
    Number,
    YesNo,
    Date,
    Lookup,
}

impl ValueClass {
    /// Coerce `value` into this class, or fail without side effects.
    ///
    /// `Null` is accepted by every class.
    pub fn convert(&self, field_name: &str, value: Value) -> Result<Value> {
        let converted = match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (ValueClass::Text, Value::Text(s)) => Some(Value::Text(s)),
            (ValueClass::Text, Value::Int(n)) => Some(Value::Text(n.to_string())),
            (ValueClass::Integer, Value::Int(n)) => Some(Value::Int(n)),
            (ValueClass::Integer, Value::Number(n)) if n.fract() == 0.0 => {
                Some(Value::Int(n as i64))
            }
            (ValueClass::Integer, Value::Text(s)) => s.trim().parse::<i64>().ok().map(Value::Int),
            (ValueClass::Number, Value::Number(n)) => Some(Value::Number(n)),
            (ValueClass::Number, Value::Int(n)) => Some(Value::Number(n as f64)),
            (ValueClass::Number, Value::Text(s)) => {
                s.trim().parse::<f64>().ok().map(Value::Number)
            }
            (ValueClass::YesNo, Value::Bool(b)) => Some(Value::Bool(b)),
            (ValueClass::YesNo, Value::Text(s)) => match s.as_str() {
                "Y" | "true" => Some(Value::Bool(true)),
                "N" | "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (ValueClass::Date, Value::Date(d)) => Some(Value::Date(d)),
            (ValueClass::Date, Value::Text(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .map(Value::Date),
            (ValueClass::Lookup, Value::Lookup { key, display }) => {
                Some(Value::Lookup { key, display })
            }
            (ValueClass::Lookup, Value::Int(n)) => Some(Value::Lookup {
                key: n.to_string(),
                display: String::new(),
            }),
            _ => None,
        };

        converted.ok_or_else(|| {
            StateError::validation(format!(
                "value is not a valid {:?} for field '{}'",
                self, field_name
            ))
        })
    }
}
