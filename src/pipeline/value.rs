//! Values flowing through the shared store.
//!
//! `Value` is a closed tagged variant. Every key in the store holds one, and
//! the first non-absent publish for a key fixes its `ValueKind` for the rest
//! of the run.

use std::fmt;
use std::sync::Arc;

/// The kind of a [`Value`], used for per-key type stability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Number,
    Text,
    Binary,
    Absent,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Number => write!(f, "number"),
            ValueKind::Text => write!(f, "text"),
            ValueKind::Binary => write!(f, "binary"),
            ValueKind::Absent => write!(f, "absent"),
        }
    }
}

/// A single named value in the shared store.
///
/// Binary buffers (camera frames and the like) are reference counted so a
/// value can be cloned into several consumers without copying the pixels.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
    Binary(Arc<[u8]>),
    #[default]
    Absent,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::Text(_) => ValueKind::Text,
            Value::Binary(_) => ValueKind::Binary,
            Value::Absent => ValueKind::Absent,
        }
    }

    #[inline]
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(v) => Some(v),
            _ => None,
        }
    }

    /// Truthiness for run-condition gating.
    ///
    /// Returns `None` for kinds that cannot act as a gate (number, text, binary).
    pub fn gate(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Absent => Some(false),
            _ => None,
        }
    }

    /// Whether this value may be published to a key whose kind is `established`.
    ///
    /// The first non-absent publish fixes a key's kind for good; `absent` may
    /// always be published.
    pub fn fits(&self, established: Option<ValueKind>) -> bool {
        self.is_absent() || established.map_or(true, |kind| kind == self.kind())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Absent)
    }
}
