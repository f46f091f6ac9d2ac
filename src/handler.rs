//! Pluggable per-domain event handlers
//!
//! The core never interprets event semantics; a handler does. Each
//! handler declares which events it accepts and, per event, a typed
//! field-descriptor table. The processor validates the table *before*
//! `handle` runs, so handler code can rely on declared required fields
//! being present and well-typed.

use crate::builder::StateBuilder;
use crate::errors::Result;
use crate::event::{EventRecord, FieldDescriptor};

/// Domain-specific mapping from raw events to state mutations
pub trait EventHandler {
    /// Stable identifier for logs and diagnostics
    fn id(&self) -> &'static str;

    /// Whether this handler wants `event`
    fn accepts(&self, event: &EventRecord) -> bool;

    /// Declared fields for an accepted event. Validated by the processor
    /// before dispatch; an empty table skips validation.
    fn descriptors(&self, event: &EventRecord) -> &'static [FieldDescriptor];

    /// Apply `event` to the state system
    fn handle(&mut self, builder: &mut StateBuilder, event: &EventRecord) -> Result<()>;
}
