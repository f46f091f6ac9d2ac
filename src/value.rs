//! Typed state values stored in intervals
//!
//! Attributes hold opaque typed values; the core never interprets them.
//! `Null` is meaningful: it marks "no activity" and is what a `modify`
//! with no value writes to end the current interval.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value held by an attribute over one interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateValue {
    /// No value (attribute inactive)
    Null,
    /// Integer value (e.g., a stack depth or resource id)
    Int(i64),
    /// String value (e.g., a kernel or function name)
    Str(String),
}

impl StateValue {
    /// Integer payload, if this is an `Int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            StateValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if this is a `Str`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// True for `StateValue::Null`
    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }
}

impl Default for StateValue {
    fn default() -> Self {
        StateValue::Null
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Int(v)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        StateValue::Str(s.to_string())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        StateValue::Str(s)
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Null => write!(f, "null"),
            StateValue::Int(v) => write!(f, "{}", v),
            StateValue::Str(s) => write!(f, "{}", s),
        }
    }
}
