//! Row layouts: the ordered column descriptors shared by all rows in a queue.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::row::ValueType;

/// One column descriptor: name, type, and optional display width/precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
}

impl Column {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            length: None,
            precision: None,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.name, self.value_type)
    }
}

/// The ordered list of columns describing every row in one link queue.
///
/// Established once, from the first row a producer emits, and immutable for
/// the lifetime of that queue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowLayout {
    columns: Vec<Column>,
}

impl RowLayout {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Index of the named column, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Check that `other` carries the same column count and the same ordered
    /// `(name, type)` sequence as `self` (the reference layout).
    ///
    /// Length and precision are display hints and do not participate.
    ///
    /// # Errors
    ///
    /// Returns a [`LayoutMismatch`] naming the first differing column.
    pub fn check_compatible(&self, other: &RowLayout) -> Result<(), LayoutMismatch> {
        if self.columns.len() != other.columns.len() {
            return Err(LayoutMismatch::ColumnCount {
                expected: self.columns.len(),
                found: other.columns.len(),
            });
        }
        for (index, (reference, candidate)) in
            self.columns.iter().zip(other.columns.iter()).enumerate()
        {
            if reference.name != candidate.name || reference.value_type != candidate.value_type {
                return Err(LayoutMismatch::Column {
                    index,
                    expected: reference.clone(),
                    found: candidate.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A row-layout incompatibility between two queues feeding one consumer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum LayoutMismatch {
    #[error("column count differs: expected {expected}, found {found}")]
    ColumnCount { expected: usize, found: usize },
    #[error("column {index} differs: expected {expected}, found {found}")]
    Column {
        index: usize,
        expected: Column,
        found: Column,
    },
}
