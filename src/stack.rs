//! Stack semantics layered over raw interval storage
//!
//! An attribute used as a call stack never stores activity intervals on
//! itself. Its own intervals record the stack *depth* over time, and each
//! depth level is a child attribute (labelled "1", "2", ...) holding that
//! level's activity intervals. Nesting therefore never produces
//! overlapping intervals on a single attribute: a push at depth 2 writes
//! to a different quark than the enclosing push at depth 1.
//!
//! Two push flavors exist:
//!
//! - [`push`](StackEngine::push)/[`pop`](StackEngine::pop): strict LIFO,
//!   for activities whose end arrives as its own event.
//! - [`push_parallel`](StackEngine::push_parallel): for activities whose
//!   end timestamp is already known at launch (GPU kernels reported as a
//!   single record). The engine grabs the first free depth lane, so
//!   overlapping kernels on one queue occupy separate rows; the caller is
//!   expected to schedule the matching lane close through the deferred
//!   queue.
//!
//! Separating stack discipline from raw storage lets the same
//! [`IntervalStore`] back both LIFO call-stack attributes and flat
//! current-value attributes driven by [`modify`](StackEngine::modify).

use crate::attribute_tree::{AttributeTree, Quark};
use crate::config::UnmatchedPopPolicy;
use crate::errors::Result;
use crate::interval_store::IntervalStore;
use crate::value::StateValue;
use fnv::FnvHashMap;

#[derive(Debug, Default)]
struct StackState {
    /// Depth-lane quarks in depth order; index 0 is depth 1
    lanes: Vec<Quark>,
    /// Occupancy flag per lane
    busy: Vec<bool>,
    /// Current LIFO depth (top of stack), for push/pop
    depth: usize,
}

impl StackState {
    fn busy_count(&self) -> usize {
        self.busy.iter().filter(|b| **b).count()
    }
}

/// Per-attribute stack bookkeeping on top of the interval store
#[derive(Debug, Default)]
pub struct StackEngine {
    stacks: FnvHashMap<Quark, StackState>,
    /// depth-lane quark -> owning stack quark, for deferred lane closes
    lane_owner: FnvHashMap<Quark, Quark>,
}

impl StackEngine {
    pub fn new() -> Self {
        StackEngine::default()
    }

    /// Depth-lane quark for `depth` (1-based) under `stack`, created on
    /// first use
    fn lane_quark(
        &mut self,
        tree: &mut AttributeTree,
        store: &mut IntervalStore,
        stack: Quark,
        depth: usize,
    ) -> Result<Quark> {
        let state = self.stacks.entry(stack).or_default();
        if let Some(&quark) = state.lanes.get(depth - 1) {
            return Ok(quark);
        }
        // Lanes are created in order, one at a time.
        let quark = tree.quark_relative_and_add(stack, &depth.to_string())?;
        store.ensure(quark);
        let state = self.stacks.entry(stack).or_default();
        state.lanes.push(quark);
        state.busy.push(false);
        self.lane_owner.insert(quark, stack);
        Ok(quark)
    }

    /// Write the depth value onto the stack attribute itself at `time`
    fn write_depth(
        &self,
        store: &mut IntervalStore,
        stack: Quark,
        time: i64,
        depth: usize,
    ) -> Result<()> {
        store.close_at_replace(stack, time)?;
        if depth > 0 {
            store.open(stack, time, StateValue::Int(depth as i64))?;
        }
        Ok(())
    }

    /// Push `value` onto the stack attribute `stack` at `time`, one level
    /// deeper than the current top.
    pub fn push(
        &mut self,
        tree: &mut AttributeTree,
        store: &mut IntervalStore,
        time: i64,
        value: StateValue,
        stack: Quark,
    ) -> Result<()> {
        let depth = self.stacks.entry(stack).or_default().depth + 1;
        let lane = self.lane_quark(tree, store, stack, depth)?;
        // A new activity may start on the tick its predecessor at the same
        // depth ended on; replacement keeps the lane legal.
        store.close_at_replace(lane, time)?;
        store.open(lane, time, value)?;
        let state = self.stacks.entry(stack).or_default();
        state.depth = depth;
        state.busy[depth - 1] = true;
        self.write_depth(store, stack, time, depth)?;
        Ok(())
    }

    /// Pop the most recent push at `time`, committing the top interval
    /// with `time` as its inclusive end. Returns the popped value, or
    /// `None` when the stack was empty (tolerated per `policy`).
    pub fn pop(
        &mut self,
        store: &mut IntervalStore,
        time: i64,
        stack: Quark,
        policy: UnmatchedPopPolicy,
    ) -> Result<Option<StateValue>> {
        let state = self.stacks.entry(stack).or_default();
        if state.depth == 0 {
            if policy == UnmatchedPopPolicy::Warn {
                tracing::warn!(
                    quark = stack,
                    time,
                    "pop with no matching push (truncated trace?), ignoring"
                );
            }
            return Ok(None);
        }
        let depth = state.depth;
        let lane = state.lanes[depth - 1];
        let interval = store.close(lane, time)?;
        let state = self.stacks.entry(stack).or_default();
        state.busy[depth - 1] = false;
        state.depth = depth - 1;
        // Depth value changes on the next tick; the popped activity owns
        // its end timestamp.
        self.write_depth(store, stack, time + 1, depth - 1)?;
        Ok(Some(interval.value))
    }

    /// Place an activity with a known end on the first free depth lane of
    /// `stack`. Returns the lane quark; the caller schedules the close
    /// (see [`DeferredQueue`](crate::deferred::DeferredQueue)).
    pub fn push_parallel(
        &mut self,
        tree: &mut AttributeTree,
        store: &mut IntervalStore,
        time: i64,
        value: StateValue,
        stack: Quark,
    ) -> Result<Quark> {
        let mut depth = 1;
        loop {
            let lane = self.lane_quark(tree, store, stack, depth)?;
            let state = self.stacks.entry(stack).or_default();
            let free = !state.busy[depth - 1]
                && store
                    .intervals(lane)?
                    .last()
                    .is_none_or(|interval| interval.end < time);
            if free {
                store.open(lane, time, value)?;
                let state = self.stacks.entry(stack).or_default();
                state.busy[depth - 1] = true;
                let occupancy = state.busy_count();
                self.write_depth(store, stack, time, occupancy)?;
                return Ok(lane);
            }
            depth += 1;
        }
    }

    /// Close the lane `lane` at `time` after a deferred parallel activity
    /// ends, and update the owning stack's occupancy value.
    pub fn close_lane(
        &mut self,
        store: &mut IntervalStore,
        time: i64,
        lane: Quark,
        policy: UnmatchedPopPolicy,
    ) -> Result<()> {
        if store.ongoing(lane)?.is_none() {
            if policy == UnmatchedPopPolicy::Warn {
                tracing::warn!(quark = lane, time, "lane close with nothing open, ignoring");
            }
            return Ok(());
        }
        store.close(lane, time)?;
        if let Some(&stack) = self.lane_owner.get(&lane) {
            let state = self.stacks.entry(stack).or_default();
            if let Some(idx) = state.lanes.iter().position(|&q| q == lane) {
                state.busy[idx] = false;
            }
            state.depth = state.depth.min(state.busy_count());
            let occupancy = state.busy_count();
            self.write_depth(store, stack, time + 1, occupancy)?;
        }
        Ok(())
    }

    /// Set or clear the current value of a flat (non-stack) attribute.
    /// Any open interval is closed at `time - 1`; a non-null `value`
    /// opens a new interval at `time`, a null one marks end of activity.
    pub fn modify(
        &mut self,
        store: &mut IntervalStore,
        time: i64,
        value: StateValue,
        quark: Quark,
    ) -> Result<()> {
        store.close_at_replace(quark, time)?;
        if !value.is_null() {
            store.open(quark, time, value)?;
        }
        Ok(())
    }

    /// Current LIFO depth of `stack` (0 when empty)
    pub fn depth(&self, stack: Quark) -> usize {
        self.stacks.get(&stack).map_or(0, |state| state.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_tree::AttributeTree;

    fn setup() -> (AttributeTree, IntervalStore, StackEngine, Quark) {
        let mut tree = AttributeTree::new();
        let stack = tree.quark_absolute_and_add(&["gpu0", "queues", "queue1"]);
        let mut store = IntervalStore::new();
        store.ensure(stack);
        (tree, store, StackEngine::new(), stack)
    }

    #[test]
    fn test_push_pop_round_trip() {
        let (mut tree, mut store, mut engine, stack) = setup();
        engine
            .push(&mut tree, &mut store, 100, "kernelA".into(), stack)
            .unwrap();
        let popped = engine
            .pop(&mut store, 250, stack, UnmatchedPopPolicy::Ignore)
            .unwrap();
        assert_eq!(popped, Some("kernelA".into()));

        let lane = tree.quark_absolute(&["gpu0", "queues", "queue1", "1"]).unwrap();
        let intervals = store.intervals(lane).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!((intervals[0].start, intervals[0].end), (100, 250));
        assert_eq!(intervals[0].value, "kernelA".into());
    }

    #[test]
    fn test_nested_pushes_use_separate_lanes() {
        let (mut tree, mut store, mut engine, stack) = setup();
        engine
            .push(&mut tree, &mut store, 10, "outer".into(), stack)
            .unwrap();
        engine
            .push(&mut tree, &mut store, 20, "inner".into(), stack)
            .unwrap();
        assert_eq!(engine.depth(stack), 2);

        engine
            .pop(&mut store, 30, stack, UnmatchedPopPolicy::Ignore)
            .unwrap();
        engine
            .pop(&mut store, 50, stack, UnmatchedPopPolicy::Ignore)
            .unwrap();
        assert_eq!(engine.depth(stack), 0);

        let lane1 = tree.quark_absolute(&["gpu0", "queues", "queue1", "1"]).unwrap();
        let lane2 = tree.quark_absolute(&["gpu0", "queues", "queue1", "2"]).unwrap();
        let outer = &store.intervals(lane1).unwrap()[0];
        let inner = &store.intervals(lane2).unwrap()[0];
        assert_eq!((outer.start, outer.end), (10, 50));
        assert_eq!((inner.start, inner.end), (20, 30));
    }

    #[test]
    fn test_depth_recorded_on_stack_attribute() {
        let (mut tree, mut store, mut engine, stack) = setup();
        engine
            .push(&mut tree, &mut store, 10, "outer".into(), stack)
            .unwrap();
        engine
            .push(&mut tree, &mut store, 20, "inner".into(), stack)
            .unwrap();
        engine
            .pop(&mut store, 30, stack, UnmatchedPopPolicy::Ignore)
            .unwrap();
        engine
            .pop(&mut store, 50, stack, UnmatchedPopPolicy::Ignore)
            .unwrap();

        let depths = store.intervals(stack).unwrap();
        assert_eq!(depths.len(), 3);
        assert_eq!((depths[0].start, depths[0].end, depths[0].value.clone()),
            (10, 19, StateValue::Int(1)));
        assert_eq!((depths[1].start, depths[1].end, depths[1].value.clone()),
            (20, 30, StateValue::Int(2)));
        assert_eq!((depths[2].start, depths[2].end, depths[2].value.clone()),
            (31, 50, StateValue::Int(1)));
    }

    #[test]
    fn test_unmatched_pop_is_tolerated() {
        let (_, mut store, mut engine, stack) = setup();
        let popped = engine
            .pop(&mut store, 10, stack, UnmatchedPopPolicy::Warn)
            .unwrap();
        assert_eq!(popped, None);
        assert_eq!(store.intervals(stack).unwrap().len(), 0);
    }

    #[test]
    fn test_push_parallel_allocates_free_lane() {
        let (mut tree, mut store, mut engine, stack) = setup();
        // Two overlapping kernels: second must land on lane 2.
        let lane_a = engine
            .push_parallel(&mut tree, &mut store, 100, "kernelA".into(), stack)
            .unwrap();
        let lane_b = engine
            .push_parallel(&mut tree, &mut store, 150, "kernelB".into(), stack)
            .unwrap();
        assert_ne!(lane_a, lane_b);

        engine
            .close_lane(&mut store, 250, lane_a, UnmatchedPopPolicy::Ignore)
            .unwrap();
        // Lane 1 is free again for a kernel starting after 250.
        let lane_c = engine
            .push_parallel(&mut tree, &mut store, 260, "kernelC".into(), stack)
            .unwrap();
        assert_eq!(lane_c, lane_a);
    }

    #[test]
    fn test_modify_convention() {
        let mut tree = AttributeTree::new();
        let quark = tree.quark_absolute_and_add(&["mem", "copy"]);
        let mut store = IntervalStore::new();
        store.ensure(quark);
        let mut engine = StackEngine::new();

        engine.modify(&mut store, 10, "H2D".into(), quark).unwrap();
        engine
            .modify(&mut store, 50, StateValue::Null, quark)
            .unwrap();

        let intervals = store.intervals(quark).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!((intervals[0].start, intervals[0].end), (10, 49));
        assert_eq!(intervals[0].value, "H2D".into());
        assert!(store.query_point(quark, 60).unwrap().is_none());
    }

    #[test]
    fn test_modify_replacement_same_tick() {
        let mut tree = AttributeTree::new();
        let quark = tree.quark_absolute_and_add(&["mem", "copy"]);
        let mut store = IntervalStore::new();
        store.ensure(quark);
        let mut engine = StackEngine::new();

        engine.modify(&mut store, 10, "H2D".into(), quark).unwrap();
        engine.modify(&mut store, 10, "D2H".into(), quark).unwrap();
        engine
            .modify(&mut store, 20, StateValue::Null, quark)
            .unwrap();

        let intervals = store.intervals(quark).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].value, "D2H".into());
    }
}
