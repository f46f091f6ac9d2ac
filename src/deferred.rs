//! Deferred (future) mutation queue
//!
//! Some trace formats report an activity's start *and* end on a single
//! record observed at start time. Committing the interval immediately
//! would race the ordered-commit invariant of sibling attributes still
//! being written, so the mutation is queued here instead and applied once
//! the processing cursor reaches its scheduled timestamp.
//!
//! The queue is a binary heap keyed by (scheduled time, insertion
//! sequence): entries sharing a timestamp drain in the order they were
//! scheduled, which makes replays deterministic.

use crate::attribute_tree::Quark;
use crate::value::StateValue;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Mutation kind carried by a deferred entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Push `value` onto a stack attribute
    Push(StateValue),
    /// Pop the top of a stack attribute
    Pop,
    /// Close a specific depth lane (parallel activities with known end)
    CloseLane,
    /// Set or clear a flat attribute's current value
    Modify(StateValue),
}

/// One scheduled mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredMutation {
    pub time: i64,
    pub quark: Quark,
    pub kind: Mutation,
    seq: u64,
}

impl Ord for DeferredMutation {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap behavior comes from Reverse at the call site; here we
        // define the natural (time, seq) order.
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

impl PartialOrd for DeferredMutation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of mutations scheduled for timestamps the processing
/// cursor has not reached yet
#[derive(Debug, Default)]
pub struct DeferredQueue {
    heap: BinaryHeap<Reverse<DeferredMutation>>,
    next_seq: u64,
}

impl DeferredQueue {
    pub fn new() -> Self {
        DeferredQueue::default()
    }

    /// Enqueue `kind` against `quark`, to be applied at `time`
    pub fn schedule(&mut self, time: i64, quark: Quark, kind: Mutation) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(DeferredMutation {
            time,
            quark,
            kind,
            seq,
        }));
    }

    /// Remove and return every entry with scheduled time <= `up_to`,
    /// ordered by (time, insertion sequence)
    pub fn drain(&mut self, up_to: i64) -> Vec<DeferredMutation> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.time > up_to {
                break;
            }
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    /// Scheduled time of the next due entry, if any
    pub fn next_time(&self) -> Option<i64> {
        self.heap.peek().map(|Reverse(entry)| entry.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
