//! Frozen, read-only state system
//!
//! Produced by [`StateBuilder::finish`](crate::builder::StateBuilder::finish).
//! Every interval sequence is immutable from here on, so all four query
//! operations take `&self` and are safe to call from any number of
//! concurrent readers with no locking. This is the surface the (external)
//! query/rendering layer consumes: tree listings, timelines, tooltips and
//! full-state snapshots.

use crate::attribute_tree::{AttributeTree, Quark};
use crate::errors::Result;
use crate::interval_store::{IntervalStore, RangeQuery, StateInterval};
use serde::Serialize;

/// One attribute in a tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDescriptor {
    pub quark: Quark,
    pub parent: Option<Quark>,
    /// Full path from the root, `/`-joined
    pub path: String,
    /// Last path segment
    pub label: String,
}

/// Immutable time-indexed record of a fully processed trace
#[derive(Debug)]
pub struct StateSystem {
    tree: AttributeTree,
    store: IntervalStore,
    start_time: i64,
    end_time: i64,
}

impl StateSystem {
    pub(crate) fn new(
        tree: AttributeTree,
        store: IntervalStore,
        start_time: i64,
        end_time: i64,
    ) -> Self {
        StateSystem {
            tree,
            store,
            start_time,
            end_time,
        }
    }

    /// First event timestamp seen while building
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Timestamp every ongoing interval was closed at
    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    pub fn tree(&self) -> &AttributeTree {
        &self.tree
    }

    /// Total committed interval count
    pub fn interval_count(&self) -> usize {
        self.store.interval_count()
    }

    /// Tooltip query: the single interval (if any) covering `time`
    pub fn query_point(&self, quark: Quark, time: i64) -> Result<Option<&StateInterval>> {
        self.store.query_point(quark, time)
    }

    /// Timeline query: every interval on the given attributes whose span
    /// intersects `[t0, t1]`, ordered by attribute then start time. The
    /// returned cursor is lazy, restartable, and supports a cancellation
    /// check polled between attribute groups.
    pub fn query_range<'a>(
        &'a self,
        quarks: &[Quark],
        t0: i64,
        t1: i64,
    ) -> Result<RangeQuery<'a>> {
        self.store.query_range(quarks, t0, t1)
    }

    /// Full-state snapshot: the value of every attribute at `time`,
    /// indexed by quark (`None` where no interval covers `time`)
    pub fn query_full_state(&self, time: i64) -> Vec<Option<&StateInterval>> {
        (0..self.tree.len())
            .map(|quark| self.store.query_point(quark, time).unwrap_or(None))
            .collect()
    }

    /// Tree listing: path and quark of every attribute under `root`, in
    /// creation order
    pub fn attributes(&self, root: Quark) -> Result<Vec<AttributeDescriptor>> {
        let quarks = self.tree.sub_tree(root)?;
        let mut out = Vec::with_capacity(quarks.len());
        for quark in quarks {
            out.push(AttributeDescriptor {
                quark,
                parent: self.tree.parent(quark)?,
                path: self.tree.path(quark)?.join("/"),
                label: self.tree.label(quark)?.to_string(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_tree::ROOT_QUARK;
    use crate::builder::StateBuilder;

    fn frozen() -> StateSystem {
        let mut builder = StateBuilder::default();
        let copy = builder.quark_absolute_and_add(&["mem", "copy"]);
        let stack = builder.quark_absolute_and_add(&["gpu0", "queues", "queue1"]);

        builder.advance(10).unwrap();
        builder.modify_attribute(10, "H2D".into(), copy).unwrap();
        builder.push_attribute(20, "kernelA".into(), stack).unwrap();
        builder.advance(50).unwrap();
        builder
            .modify_attribute(50, crate::value::StateValue::Null, copy)
            .unwrap();
        builder.pop_attribute(80, stack).unwrap();
        builder.finish(Some(100)).unwrap()
    }

    #[test]
    fn test_point_and_range_agree() {
        let system = frozen();
        let copy = system.tree().quark_absolute(&["mem", "copy"]).unwrap();

        let at_30 = system.query_point(copy, 30).unwrap().unwrap();
        assert_eq!((at_30.start, at_30.end), (10, 49));

        let ranged: Vec<_> = system.query_range(&[copy], 0, 1_000).unwrap().collect();
        assert_eq!(ranged, vec![at_30]);
    }

    #[test]
    fn test_full_state_snapshot() {
        let system = frozen();
        let copy = system.tree().quark_absolute(&["mem", "copy"]).unwrap();
        let lane = system
            .tree()
            .quark_absolute(&["gpu0", "queues", "queue1", "1"])
            .unwrap();

        let snapshot = system.query_full_state(30);
        assert_eq!(snapshot[copy].unwrap().value, "H2D".into());
        assert_eq!(snapshot[lane].unwrap().value, "kernelA".into());
        assert!(system.query_full_state(99)[copy].is_none());
    }

    #[test]
    fn test_attribute_listing() {
        let system = frozen();
        let listing = system.attributes(ROOT_QUARK).unwrap();
        let paths: Vec<_> = listing.iter().map(|a| a.path.as_str()).collect();
        assert!(paths.contains(&"mem/copy"));
        assert!(paths.contains(&"gpu0/queues/queue1"));
        assert!(paths.contains(&"gpu0/queues/queue1/1"));

        let copy = listing.iter().find(|a| a.path == "mem/copy").unwrap();
        assert_eq!(copy.label, "copy");
        let mem = system.tree().quark_absolute(&["mem"]).unwrap();
        assert_eq!(copy.parent, Some(mem));
    }

    #[test]
    fn test_concurrent_readers() {
        use std::sync::Arc;
        use std::thread;

        let system = Arc::new(frozen());
        let copy = system.tree().quark_absolute(&["mem", "copy"]).unwrap();

        let mut handles = vec![];
        for _ in 0..8 {
            let system = Arc::clone(&system);
            handles.push(thread::spawn(move || {
                for t in 0..100 {
                    let _ = system.query_point(copy, t).unwrap();
                }
                system.query_range(&[copy], 0, 100).unwrap().count()
            }));
        }
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
    }
}
