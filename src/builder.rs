//! Single-writer build facade over the state system
//!
//! `StateBuilder` is what domain handlers mutate: it owns the attribute
//! tree, the interval store, the per-attribute stacks, the deferred
//! mutation queue and the correlation map, and guarantees their
//! invariants hold across any legal call sequence. Mutations are applied
//! in strict event-delivery order by a single logical writer; once
//! [`finish`](StateBuilder::finish) runs, the result is an immutable
//! [`StateSystem`](crate::state_system::StateSystem) safe for concurrent
//! readers.
//!
//! # Reading while building
//!
//! One policy, applied everywhere: committed intervals at or before
//! [`safe_time`](StateBuilder::safe_time) are final and may be queried;
//! open intervals are only visible through
//! [`query_ongoing`](StateBuilder::query_ongoing), which wraps them in
//! [`ProvisionalInterval`] so a reader can never mistake an in-progress
//! activity for a committed one.

use crate::attribute_tree::{AttributeTree, Quark};
use crate::config::{ErrorPolicy, StateConfig};
use crate::correlation::{CorrelationMap, EventSnapshot};
use crate::deferred::{DeferredQueue, Mutation};
use crate::errors::{Result, StateError};
use crate::interval_store::{IntervalStore, StateInterval};
use crate::stack::StackEngine;
use crate::state_system::StateSystem;
use crate::value::StateValue;
use serde::Serialize;

/// Snapshot of an open (in-progress) interval
///
/// The end is unknown; `seen_up_to` is the cursor position at the time of
/// the query, i.e. the latest instant the value is known to still hold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionalInterval {
    pub quark: Quark,
    pub start: i64,
    pub seen_up_to: i64,
    pub value: StateValue,
}

/// Mutable state system under construction
#[derive(Debug)]
pub struct StateBuilder {
    tree: AttributeTree,
    store: IntervalStore,
    stacks: StackEngine,
    deferred: DeferredQueue,
    correlation: CorrelationMap,
    config: StateConfig,
    current_time: i64,
    start_time: Option<i64>,
    dropped_mutations: u64,
}

impl StateBuilder {
    pub fn new(config: StateConfig) -> Self {
        StateBuilder {
            tree: AttributeTree::new(),
            store: IntervalStore::new(),
            stacks: StackEngine::new(),
            deferred: DeferredQueue::new(),
            correlation: CorrelationMap::new(),
            config,
            current_time: i64::MIN,
            start_time: None,
            dropped_mutations: 0,
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    pub fn tree(&self) -> &AttributeTree {
        &self.tree
    }

    /// Mutations up to and including this timestamp have been applied
    pub fn safe_time(&self) -> i64 {
        self.current_time
    }

    /// Count of mutations dropped under skip-and-continue
    pub fn dropped_mutations(&self) -> u64 {
        self.dropped_mutations
    }

    /// Get-or-add resolution of a full attribute path
    pub fn quark_absolute_and_add(&mut self, path: &[&str]) -> Quark {
        let quark = self.tree.quark_absolute_and_add(path);
        // Intermediate path segments got quarks too; every attribute in
        // the tree must be queryable.
        self.store.ensure(self.tree.len() - 1);
        quark
    }

    /// Get-or-add resolution below an existing attribute
    pub fn quark_relative_and_add(&mut self, parent: Quark, label: &str) -> Result<Quark> {
        let quark = self.tree.quark_relative_and_add(parent, label)?;
        self.store.ensure(self.tree.len() - 1);
        Ok(quark)
    }

    /// Set or clear a flat attribute's current value at `time`
    pub fn modify_attribute(&mut self, time: i64, value: StateValue, quark: Quark) -> Result<()> {
        self.stacks.modify(&mut self.store, time, value, quark)
    }

    /// Push an activity onto a stack attribute at `time`
    pub fn push_attribute(&mut self, time: i64, value: StateValue, quark: Quark) -> Result<()> {
        self.stacks
            .push(&mut self.tree, &mut self.store, time, value, quark)
    }

    /// Pop the most recent push at `time`; unmatched pops follow the
    /// configured policy and return `None`
    pub fn pop_attribute(&mut self, time: i64, quark: Quark) -> Result<Option<StateValue>> {
        self.stacks
            .pop(&mut self.store, time, quark, self.config.unmatched_pop)
    }

    /// Record an activity whose end timestamp is already known: it lands
    /// on the first free depth lane of `stack` now, and the lane close is
    /// scheduled on the deferred queue for `end_time`.
    pub fn push_parallel_activity(
        &mut self,
        time: i64,
        end_time: i64,
        value: StateValue,
        stack: Quark,
    ) -> Result<Quark> {
        let lane =
            self.stacks
                .push_parallel(&mut self.tree, &mut self.store, time, value, stack)?;
        self.deferred.schedule(end_time, lane, Mutation::CloseLane);
        Ok(lane)
    }

    /// Schedule a mutation for a timestamp the cursor has not reached
    pub fn schedule(&mut self, time: i64, quark: Quark, kind: Mutation) {
        self.deferred.schedule(time, quark, kind);
    }

    /// Store a correlation snapshot under `key`
    pub fn record_correlation(&mut self, key: u64, snapshot: EventSnapshot) {
        self.correlation.record(key, snapshot);
    }

    /// Join against an earlier event by correlation key, honoring the
    /// configured retention policy. A miss is `None`, never an error.
    pub fn lookup_correlation(&mut self, key: u64) -> Option<EventSnapshot> {
        self.correlation
            .resolve(key, self.config.correlation_retention)
    }

    /// String field from the correlated snapshot, or the configured
    /// placeholder when the key or field is unknown
    pub fn correlation_str_or_placeholder(&mut self, key: u64, field: &str) -> String {
        match self.lookup_correlation(key) {
            Some(snapshot) => snapshot
                .field_str(field)
                .unwrap_or(&self.config.correlation_placeholder)
                .to_string(),
            None => self.config.correlation_placeholder.clone(),
        }
    }

    /// Advance the processing cursor to `time`, applying every due
    /// deferred mutation first, in (scheduled time, sequence) order.
    pub fn advance(&mut self, time: i64) -> Result<()> {
        if time < self.current_time {
            tracing::warn!(
                time,
                cursor = self.current_time,
                "event timestamp behind the processing cursor"
            );
        }
        for entry in self.deferred.drain(time) {
            let applied = self.apply(entry.time, entry.quark, entry.kind);
            self.absorb(applied)?;
        }
        self.start_time.get_or_insert(time);
        self.current_time = self.current_time.max(time);
        Ok(())
    }

    fn apply(&mut self, time: i64, quark: Quark, kind: Mutation) -> Result<()> {
        match kind {
            Mutation::Push(value) => self.push_attribute(time, value, quark),
            Mutation::Pop => self.pop_attribute(time, quark).map(|_| ()),
            Mutation::CloseLane => self.stacks.close_lane(
                &mut self.store,
                time,
                quark,
                self.config.unmatched_pop,
            ),
            Mutation::Modify(value) => self.modify_attribute(time, value, quark),
        }
    }

    /// Apply the error policy to one mutation outcome: data errors are
    /// dropped (with a warning) under skip-and-continue, escalated under
    /// fail-fast; anything else always propagates.
    pub fn absorb(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_data_error() => match self.config.error_policy {
                ErrorPolicy::SkipAndContinue => {
                    self.dropped_mutations += 1;
                    tracing::warn!(error = %err, "dropping malformed mutation");
                    Ok(())
                }
                ErrorPolicy::FailFast => Err(StateError::Aborted {
                    source: Box::new(err),
                }),
            },
            Err(err) => Err(err),
        }
    }

    /// Open interval on `quark`, explicitly flagged as provisional
    pub fn query_ongoing(&self, quark: Quark) -> Result<Option<ProvisionalInterval>> {
        Ok(self
            .store
            .ongoing(quark)?
            .map(|(start, value)| ProvisionalInterval {
                quark,
                start,
                seen_up_to: self.current_time,
                value: value.clone(),
            }))
    }

    /// Committed interval covering `time`, readable while building as
    /// long as `time <= safe_time()`
    pub fn query_point(&self, quark: Quark, time: i64) -> Result<Option<StateInterval>> {
        Ok(self.store.query_point(quark, time)?.cloned())
    }

    /// Flush everything and freeze into an immutable [`StateSystem`].
    ///
    /// Remaining deferred mutations are applied at their scheduled times
    /// (the end-of-trace `drain(+inf)`); intervals still open after that
    /// are closed at the trace end time. Leftover correlation snapshots
    /// are reported and discarded — truncated input must not poison the
    /// query phase.
    pub fn finish(mut self, end_time: Option<i64>) -> Result<StateSystem> {
        let mut last_applied = self.current_time;
        for entry in self.deferred.drain(i64::MAX) {
            last_applied = last_applied.max(entry.time);
            let applied = self.apply(entry.time, entry.quark, entry.kind);
            self.absorb(applied)?;
        }
        let end = end_time
            .unwrap_or(last_applied)
            .max(last_applied)
            .max(self.start_time.unwrap_or(0));
        let flushed = self.store.close_ongoing(end);
        if flushed > 0 {
            tracing::debug!(flushed, end, "closed ongoing intervals at trace end");
        }
        if !self.correlation.is_empty() {
            tracing::warn!(
                leftover = self.correlation.len(),
                "unconsumed correlation snapshots at end of trace (truncated input?)"
            );
        }
        Ok(StateSystem::new(
            self.tree,
            self.store,
            self.start_time.unwrap_or(0),
            end,
        ))
    }
}

impl Default for StateBuilder {
    fn default() -> Self {
        StateBuilder::new(StateConfig::default())
    }
}
