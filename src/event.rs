//! Decoded event records and typed field descriptors
//!
//! The decoding layer (out of scope here) hands the core an ordered
//! sequence of [`EventRecord`]s: a nanosecond timestamp, an event name,
//! and a small set of named typed fields. Which fields an event carries is
//! domain-specific and interpreted by the registered
//! [`EventHandler`](crate::handler::EventHandler), not by the core.
//!
//! Handlers declare the fields they rely on as [`FieldDescriptor`] tables,
//! validated *before* dispatch. This replaces any runtime
//! lookup-by-name-and-type scheme: the core only ever moves opaque typed
//! values around, and a malformed event is rejected in one place with a
//! precise error instead of surfacing as a `None` deep inside a handler.

use crate::errors::{Result, StateError};
use serde::{Deserialize, Serialize};

/// One typed field on an event record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Str(String),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

/// A single decoded trace event
///
/// Timestamps are nanoseconds on the trace's own clock. Events must be
/// delivered to the processor in non-decreasing timestamp order; the
/// decoding layer owns the sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event timestamp in nanoseconds
    pub timestamp: i64,
    /// Event name (dispatch key for handlers)
    pub name: String,
    /// Named typed fields, in decode order
    fields: Vec<(String, FieldValue)>,
}

impl EventRecord {
    pub fn new(timestamp: i64, name: impl Into<String>) -> Self {
        EventRecord {
            timestamp,
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field attachment
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Raw field lookup by name
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Integer field, `None` if absent or not an integer
    pub fn field_int(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(FieldValue::as_int)
    }

    /// String field, `None` if absent or not a string
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_str)
    }

    /// All fields in decode order
    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }
}

/// Expected type of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Str,
}

impl FieldKind {
    fn label(self) -> &'static str {
        match self {
            FieldKind::Int => "integer",
            FieldKind::Str => "string",
        }
    }

    fn matches(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (FieldKind::Int, FieldValue::Int(_)) | (FieldKind::Str, FieldValue::Str(_))
        )
    }
}

/// Declaration of one field a handler depends on
///
/// Registered once per handler; the processor validates every accepted
/// event against the handler's descriptor table before `handle` runs.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldDescriptor {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        FieldDescriptor {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        FieldDescriptor {
            name,
            kind,
            required: false,
        }
    }

    /// Check one event against this descriptor
    pub fn validate(&self, event: &EventRecord) -> Result<()> {
        match event.field(self.name) {
            None if self.required => Err(StateError::MissingField {
                event: event.name.clone(),
                field: self.name.to_string(),
            }),
            None => Ok(()),
            Some(value) if self.kind.matches(value) => Ok(()),
            Some(_) => Err(StateError::FieldTypeMismatch {
                event: event.name.clone(),
                field: self.name.to_string(),
                expected: self.kind.label(),
            }),
        }
    }
}

/// Validate an event against a full descriptor table
pub fn validate_fields(descriptors: &[FieldDescriptor], event: &EventRecord) -> Result<()> {
    for descriptor in descriptors {
        descriptor.validate(event)?;
    }
    Ok(())
}
