//! Typed property values.
//!
//! Values are produced by value-producing actions (read name, read annotation
//! field, constant values) and stored on entities. The serialized form is the
//! `{"type": ..., "value": ...}` object used inside model records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed value attached to an entity property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// Free-form text.
    Str(String),
    /// Integer value (annotation ints, counts).
    Int(i64),
    /// Boolean value.
    Bool(bool),
    /// A type reference, stored as the binary class name.
    Type(String),
}

impl PropertyValue {
    /// Text view of string-like values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) | PropertyValue::Type(s) => Some(s),
            PropertyValue::Int(_) | PropertyValue::Bool(_) => None,
        }
    }

    /// Short tag naming the variant, as written in the serialized form.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Str(_) => "str",
            PropertyValue::Int(_) => "int",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Type(_) => "type",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => write!(f, "{}", s),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Type(name) => {
                write!(f, "{}", name.rsplit(['/', '.']).next().unwrap_or(name))
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}
