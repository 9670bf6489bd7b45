//! Row values: the ordered, typed tuples that move through link queues.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag for a row cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    Int64,
    Float64,
    Utf8,
    Binary,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Utf8 => "utf8",
            Self::Binary => "binary",
        };
        f.write_str(s)
    }
}

/// One cell of a row. `Null` is typeless; the column type lives in the
/// queue's [`crate::layout::RowLayout`], not in the cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
}

impl Value {
    /// The type tag of this cell, or `None` for `Null`.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueType::Bool),
            Self::Int64(_) => Some(ValueType::Int64),
            Self::Float64(_) => Some(ValueType::Float64),
            Self::Utf8(_) => Some(ValueType::Utf8),
            Self::Binary(_) => Some(ValueType::Binary),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<null>"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
            Self::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// An ordered tuple of cells. All rows in one link queue conform to that
/// queue's layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_tags() {
        assert_eq!(Value::Int64(1).value_type(), Some(ValueType::Int64));
        assert_eq!(
            Value::Utf8("x".to_string()).value_type(),
            Some(ValueType::Utf8)
        );
        assert_eq!(Value::Null.value_type(), None);
    }

    #[test]
    fn test_row_accessors() {
        let row = Row::new(vec![Value::Int64(7), Value::Utf8("abc".to_string())]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0).and_then(Value::as_i64), Some(7));
        assert_eq!(row.get(1).and_then(Value::as_str), Some("abc"));
        assert!(row.get(2).is_none());
    }

    #[test]
    fn test_value_serde_roundtrip() {
        let row = Row::new(vec![Value::Null, Value::Float64(1.5), Value::Bool(true)]);
        let json = serde_json::to_string(&row).expect("serialize");
        let back: Row = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(row, back);
    }
}
