//! Cross-stream correlation of asynchronous event pairs
//!
//! A GPU kernel completion lands on a different stream (and often a
//! different logical thread) than the API call that launched it; the two
//! share only a correlation id. The issuing handler records a snapshot of
//! the launch event here, and the completion handler joins against it
//! later to recover metadata like the symbolic kernel name or the target
//! stream.
//!
//! Lookup misses are expected, not errors: the launch may have been
//! filtered out or may precede the capture window. Callers substitute the
//! configured placeholder and keep going.

use crate::config::CorrelationRetention;
use crate::event::{EventRecord, FieldValue};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// Snapshot of an originating event, captured at issue time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub name: String,
    pub timestamp: i64,
    pub fields: Vec<(String, FieldValue)>,
}

impl EventSnapshot {
    pub fn of(event: &EventRecord) -> Self {
        EventSnapshot {
            name: event.name.clone(),
            timestamp: event.timestamp,
            fields: event.fields().to_vec(),
        }
    }

    pub fn field_int(&self, name: &str) -> Option<i64> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_int())
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_str())
    }
}

/// Correlation key -> originating event snapshot
#[derive(Debug, Default)]
pub struct CorrelationMap {
    entries: FnvHashMap<u64, EventSnapshot>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        CorrelationMap::default()
    }

    /// Store the snapshot for `key`. Well-formed traces never reuse a
    /// live key; a duplicate overwrites last-write-wins and is reported
    /// as a data-quality warning, not an error.
    pub fn record(&mut self, key: u64, snapshot: EventSnapshot) {
        if let Some(previous) = self.entries.insert(key, snapshot) {
            tracing::warn!(
                key,
                previous_event = %previous.name,
                "duplicate correlation key, keeping the newer snapshot"
            );
        }
    }

    /// Non-consuming lookup
    pub fn lookup(&self, key: u64) -> Option<&EventSnapshot> {
        self.entries.get(&key)
    }

    /// Lookup honoring the configured retention policy: under
    /// `ConsumeOnLookup` a hit removes the entry.
    pub fn resolve(&mut self, key: u64, retention: CorrelationRetention) -> Option<EventSnapshot> {
        match retention {
            CorrelationRetention::Retain => self.entries.get(&key).cloned(),
            CorrelationRetention::ConsumeOnLookup => self.entries.remove(&key),
        }
    }

    /// Number of unconsumed snapshots (leftovers at end of trace indicate
    /// truncated input)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
