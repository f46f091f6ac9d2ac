//! Per-attribute interval storage with point and range queries
//!
//! Each attribute owns an append-only sequence of *committed* intervals,
//! strictly ordered by start time and non-overlapping, plus at most one
//! *open* interval (start known, end pending). The stack engine is the
//! main writer; once a trace is frozen the store is immutable and every
//! query is a pure `&self` read.
//!
//! # Boundary convention
//!
//! Interval bounds are inclusive on both ends. A successor interval on the
//! same attribute must start at least at `previous end + 1`; `append`
//! rejects anything else as [`OutOfOrder`](crate::errors::StateError). The
//! one place the engine closes "one tick early" — replacement via
//! `modify`, which ends the old interval at `new start - 1` — exists
//! precisely to keep that rule intact. See [`close_at_replace`].
//!
//! [`close_at_replace`]: IntervalStore::close_at_replace

use crate::attribute_tree::Quark;
use crate::errors::{Result, StateError};
use crate::value::StateValue;
use serde::{Deserialize, Serialize};

/// One committed value-interval on one attribute
///
/// `start` and `end` are inclusive nanosecond timestamps, `start <= end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateInterval {
    pub quark: Quark,
    pub start: i64,
    pub end: i64,
    pub value: StateValue,
}

impl StateInterval {
    /// True if `time` falls inside this interval
    pub fn contains(&self, time: i64) -> bool {
        self.start <= time && time <= self.end
    }

    /// True if this interval overlaps the window `[t0, t1]`
    pub fn intersects(&self, t0: i64, t1: i64) -> bool {
        self.start <= t1 && self.end >= t0
    }
}

#[derive(Debug, Clone, Default)]
struct AttributeLane {
    committed: Vec<StateInterval>,
    /// (start, value) of the in-progress interval, if any
    open: Option<(i64, StateValue)>,
}

impl AttributeLane {
    fn last_end(&self) -> Option<i64> {
        self.committed.last().map(|interval| interval.end)
    }
}

/// Interval sequences for every attribute, indexed by quark
#[derive(Debug, Clone, Default)]
pub struct IntervalStore {
    lanes: Vec<AttributeLane>,
}

impl IntervalStore {
    pub fn new() -> Self {
        IntervalStore::default()
    }

    /// Make sure a lane exists for every quark up to `quark`. Called by
    /// the builder whenever the attribute tree grows.
    pub fn ensure(&mut self, quark: Quark) {
        if quark >= self.lanes.len() {
            self.lanes.resize_with(quark + 1, AttributeLane::default);
        }
    }

    fn lane(&self, quark: Quark) -> Result<&AttributeLane> {
        self.lanes
            .get(quark)
            .ok_or(StateError::NotFound { quark })
    }

    fn lane_mut(&mut self, quark: Quark) -> Result<&mut AttributeLane> {
        self.lanes
            .get_mut(quark)
            .ok_or(StateError::NotFound { quark })
    }

    /// Commit a fully-closed interval. Rejected as `OutOfOrder` when
    /// `start > end`, when `start` does not clear the last committed end,
    /// or as `AlreadyOpen` when an open interval would overlap it.
    pub fn append(&mut self, quark: Quark, start: i64, end: i64, value: StateValue) -> Result<()> {
        let lane = self.lane_mut(quark)?;
        if let Some((since, _)) = lane.open {
            return Err(StateError::AlreadyOpen { quark, since });
        }
        let last_end = lane.last_end();
        if start > end || last_end.is_some_and(|last| start <= last) {
            return Err(StateError::OutOfOrder {
                quark,
                start,
                end,
                last_end: last_end.unwrap_or(i64::MIN),
            });
        }
        lane.committed.push(StateInterval {
            quark,
            start,
            end,
            value,
        });
        Ok(())
    }

    /// Record the start of an interval whose end is not yet known
    pub fn open(&mut self, quark: Quark, start: i64, value: StateValue) -> Result<()> {
        let lane = self.lane_mut(quark)?;
        if let Some((since, _)) = lane.open {
            return Err(StateError::AlreadyOpen { quark, since });
        }
        let last_end = lane.last_end();
        if last_end.is_some_and(|last| start <= last) {
            return Err(StateError::OutOfOrder {
                quark,
                start,
                end: start,
                last_end: last_end.unwrap_or(i64::MIN),
            });
        }
        lane.open = Some((start, value));
        Ok(())
    }

    /// Close the open interval at `end` (inclusive) and commit it
    pub fn close(&mut self, quark: Quark, end: i64) -> Result<StateInterval> {
        let lane = self.lane_mut(quark)?;
        let (start, value) = lane.open.take().ok_or(StateError::NothingOpen { quark })?;
        // A truncated trace can close before the recorded start; clamp to
        // a degenerate single-tick interval rather than reject.
        let end = end.max(start);
        let interval = StateInterval {
            quark,
            start,
            end,
            value,
        };
        lane.committed.push(interval.clone());
        Ok(interval)
    }

    /// Close the open interval to make room for a replacement starting at
    /// `new_start`: the old interval ends at `new_start - 1`. If the open
    /// interval started at `new_start` itself it never covered a full
    /// tick, so it is dropped instead of committed.
    pub fn close_at_replace(&mut self, quark: Quark, new_start: i64) -> Result<()> {
        let lane = self.lane_mut(quark)?;
        match lane.open.take() {
            None => Ok(()),
            Some((start, _)) if start >= new_start => Ok(()),
            Some((start, value)) => {
                lane.committed.push(StateInterval {
                    quark,
                    start,
                    end: new_start - 1,
                    value,
                });
                Ok(())
            }
        }
    }

    /// Start of the open interval on `quark`, if one exists
    pub fn ongoing(&self, quark: Quark) -> Result<Option<(i64, &StateValue)>> {
        let lane = self.lane(quark)?;
        Ok(lane.open.as_ref().map(|(start, value)| (*start, value)))
    }

    /// True if any attribute still has an open interval
    pub fn has_ongoing(&self) -> bool {
        self.lanes.iter().any(|lane| lane.open.is_some())
    }

    /// Close every remaining open interval at `end_time`. Called once at
    /// end of trace; returns how many intervals were flushed this way.
    pub fn close_ongoing(&mut self, end_time: i64) -> usize {
        let mut flushed = 0;
        for (quark, lane) in self.lanes.iter_mut().enumerate() {
            if let Some((start, value)) = lane.open.take() {
                lane.committed.push(StateInterval {
                    quark,
                    start,
                    end: end_time.max(start),
                    value,
                });
                flushed += 1;
            }
        }
        flushed
    }

    /// Interval covering `time` on `quark`, if any. Binary search over the
    /// committed sequence; open intervals are *not* visible here.
    pub fn query_point(&self, quark: Quark, time: i64) -> Result<Option<&StateInterval>> {
        let lane = self.lane(quark)?;
        let idx = lane.committed.partition_point(|interval| interval.start <= time);
        if idx == 0 {
            return Ok(None);
        }
        let candidate = &lane.committed[idx - 1];
        Ok(candidate.contains(time).then_some(candidate))
    }

    /// All committed intervals on `quark`, ordered by start
    pub fn intervals(&self, quark: Quark) -> Result<&[StateInterval]> {
        Ok(&self.lane(quark)?.committed)
    }

    /// Lazily iterate every interval on the given quarks intersecting
    /// `[t0, t1]`, ordered by position in `quarks` then by start time.
    ///
    /// The iterator borrows the store immutably, so it is restartable
    /// (issue the same query again) and safe to run from many readers at
    /// once on a frozen store. A cancellation check, polled between
    /// attribute groups, allows early termination of large queries.
    pub fn query_range<'a>(
        &'a self,
        quarks: &[Quark],
        t0: i64,
        t1: i64,
    ) -> Result<RangeQuery<'a>> {
        for &quark in quarks {
            self.lane(quark)?;
        }
        Ok(RangeQuery {
            store: self,
            quarks: quarks.to_vec(),
            t0,
            t1,
            group: 0,
            idx: 0,
            positioned: false,
            cancel: None,
            cancelled: false,
        })
    }

    /// Total committed interval count (all attributes)
    pub fn interval_count(&self) -> usize {
        self.lanes.iter().map(|lane| lane.committed.len()).sum()
    }
}

/// Lazy cursor over a 2D (attributes x time window) range query
pub struct RangeQuery<'a> {
    store: &'a IntervalStore,
    quarks: Vec<Quark>,
    t0: i64,
    t1: i64,
    group: usize,
    idx: usize,
    positioned: bool,
    cancel: Option<Box<dyn Fn() -> bool + 'a>>,
    cancelled: bool,
}

impl<'a> RangeQuery<'a> {
    /// Install a cancellation check. It is polled when the cursor moves
    /// from one attribute group to the next; once it returns `true` the
    /// iterator yields nothing further.
    pub fn with_cancellation(mut self, check: impl Fn() -> bool + 'a) -> Self {
        self.cancel = Some(Box::new(check));
        self
    }

    /// True if a cancellation check stopped this query early
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    fn check_cancelled(&mut self) -> bool {
        if let Some(check) = &self.cancel {
            if check() {
                self.cancelled = true;
            }
        }
        self.cancelled
    }
}

impl<'a> Iterator for RangeQuery<'a> {
    type Item = &'a StateInterval;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cancelled || self.group >= self.quarks.len() {
                return None;
            }
            // Lanes were validated when the query was built.
            let committed = &self.store.lanes[self.quarks[self.group]].committed;
            if !self.positioned {
                // Skip straight to the first interval that can intersect.
                self.idx = committed
                    .partition_point(|interval| interval.end < self.t0);
                self.positioned = true;
            }
            if self.idx < committed.len() {
                let interval = &committed[self.idx];
                self.idx += 1;
                if interval.start > self.t1 {
                    // Sorted by start: nothing further in this lane.
                    self.idx = committed.len();
                } else if interval.intersects(self.t0, self.t1) {
                    return Some(interval);
                }
                continue;
            }
            self.group += 1;
            self.idx = 0;
            self.positioned = false;
            if self.group < self.quarks.len() && self.check_cancelled() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(quark: Quark) -> IntervalStore {
        let mut store = IntervalStore::new();
        store.ensure(quark);
        store
    }

    #[test]
    fn test_append_and_query_point() {
        let mut store = store_with(0);
        store.append(0, 10, 20, "a".into()).unwrap();
        store.append(0, 21, 30, "b".into()).unwrap();

        assert_eq!(store.query_point(0, 15).unwrap().unwrap().value, "a".into());
        assert_eq!(store.query_point(0, 21).unwrap().unwrap().value, "b".into());
        assert_eq!(store.query_point(0, 20).unwrap().unwrap().value, "a".into());
        assert!(store.query_point(0, 9).unwrap().is_none());
        assert!(store.query_point(0, 31).unwrap().is_none());
    }

    #[test]
    fn test_append_rejects_overlap() {
        let mut store = store_with(0);
        store.append(0, 10, 20, "a".into()).unwrap();
        let err = store.append(0, 20, 25, "b".into()).unwrap_err();
        assert_eq!(
            err,
            StateError::OutOfOrder {
                quark: 0,
                start: 20,
                end: 25,
                last_end: 20
            }
        );
        // start = end + 1 is the tightest legal successor
        store.append(0, 21, 25, "b".into()).unwrap();
    }

    #[test]
    fn test_append_rejects_inverted_bounds() {
        let mut store = store_with(0);
        assert!(matches!(
            store.append(0, 30, 20, "a".into()),
            Err(StateError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_open_close_round_trip() {
        let mut store = store_with(2);
        store.open(2, 100, "kernelA".into()).unwrap();
        let interval = store.close(2, 250).unwrap();
        assert_eq!(
            interval,
            StateInterval {
                quark: 2,
                start: 100,
                end: 250,
                value: "kernelA".into()
            }
        );
        assert!(store.query_point(2, 100).unwrap().is_some());
        assert!(store.query_point(2, 250).unwrap().is_some());
    }

    #[test]
    fn test_double_open_fails() {
        let mut store = store_with(0);
        store.open(0, 5, "x".into()).unwrap();
        assert_eq!(
            store.open(0, 8, "y".into()).unwrap_err(),
            StateError::AlreadyOpen { quark: 0, since: 5 }
        );
    }

    #[test]
    fn test_close_without_open_fails() {
        let mut store = store_with(0);
        assert_eq!(
            store.close(0, 10).unwrap_err(),
            StateError::NothingOpen { quark: 0 }
        );
    }

    #[test]
    fn test_close_before_start_clamps() {
        let mut store = store_with(0);
        store.open(0, 100, "x".into()).unwrap();
        let interval = store.close(0, 40).unwrap();
        assert_eq!((interval.start, interval.end), (100, 100));
    }

    #[test]
    fn test_close_at_replace_drops_zero_width() {
        let mut store = store_with(0);
        store.open(0, 10, "old".into()).unwrap();
        store.close_at_replace(0, 10).unwrap();
        assert_eq!(store.intervals(0).unwrap().len(), 0);
        // Lane is free again
        store.open(0, 10, "new".into()).unwrap();
    }

    #[test]
    fn test_close_at_replace_ends_previous_tick() {
        let mut store = store_with(0);
        store.open(0, 10, "H2D".into()).unwrap();
        store.close_at_replace(0, 50).unwrap();
        let intervals = store.intervals(0).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!((intervals[0].start, intervals[0].end), (10, 49));
    }

    #[test]
    fn test_close_ongoing_flushes_everything() {
        let mut store = store_with(3);
        store.open(1, 10, "a".into()).unwrap();
        store.open(3, 20, "b".into()).unwrap();
        assert!(store.has_ongoing());
        assert_eq!(store.close_ongoing(99), 2);
        assert!(!store.has_ongoing());
        assert_eq!(store.query_point(1, 99).unwrap().unwrap().value, "a".into());
        assert_eq!(store.query_point(3, 99).unwrap().unwrap().value, "b".into());
    }

    #[test]
    fn test_unknown_quark_not_found() {
        let store = IntervalStore::new();
        assert_eq!(
            store.query_point(7, 0).unwrap_err(),
            StateError::NotFound { quark: 7 }
        );
    }

    #[test]
    fn test_range_query_window_and_order() {
        let mut store = store_with(1);
        store.append(0, 0, 9, "a0".into()).unwrap();
        store.append(0, 10, 19, "a1".into()).unwrap();
        store.append(0, 20, 29, "a2".into()).unwrap();
        store.append(1, 5, 24, "b0".into()).unwrap();

        let hits: Vec<_> = store
            .query_range(&[0, 1], 12, 22)
            .unwrap()
            .map(|interval| interval.value.clone())
            .collect();
        assert_eq!(hits, vec!["a1".into(), "a2".into(), "b0".into()]);
    }

    #[test]
    fn test_range_query_is_restartable() {
        let mut store = store_with(0);
        store.append(0, 0, 4, "a".into()).unwrap();
        store.append(0, 5, 9, "b".into()).unwrap();

        let first: Vec<_> = store.query_range(&[0], 0, 100).unwrap().collect();
        let second: Vec<_> = store.query_range(&[0], 0, 100).unwrap().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_range_query_cancellation_between_groups() {
        let mut store = store_with(1);
        store.append(0, 0, 9, "a".into()).unwrap();
        store.append(1, 0, 9, "b".into()).unwrap();

        let mut query = store
            .query_range(&[0, 1], 0, 100)
            .unwrap()
            .with_cancellation(|| true);
        // First group is delivered, the check fires before the second.
        assert_eq!(query.next().unwrap().value, "a".into());
        assert!(query.next().is_none());
        assert!(query.was_cancelled());
    }

    #[test]
    fn test_range_query_unknown_quark_rejected_up_front() {
        let store = store_with(0);
        assert!(matches!(
            store.query_range(&[0, 42], 0, 10),
            Err(StateError::NotFound { quark: 42 })
        ));
    }
}
