//! Sequence-number gap bookkeeping.
//!
//! A [`GapList`] remembers the lowest and highest sequence numbers received
//! and every inclusive range in between that has not arrived yet. It is what
//! an Acknack reports back to the station to request retransmission.

use std::collections::BTreeMap;

use cd11_frame::SequenceRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One missing range and the last time it changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub start: u64,
    pub end: u64,
    pub modified: DateTime<Utc>,
}

impl Gap {
    pub fn range(&self) -> SequenceRange {
        SequenceRange::new(self.start, self.end)
    }
}

/// State reported in an outgoing Acknack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapSnapshot {
    pub lowest: u64,
    pub highest: u64,
    pub gaps: Vec<SequenceRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapList {
    bounds: Option<(u64, u64)>,
    /// Keyed by gap start; ranges never overlap or touch a received value.
    gaps: BTreeMap<u64, Gap>,
}

impl GapList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one received sequence number.
    pub fn add(&mut self, value: u64, now: DateTime<Utc>) {
        self.add_range(value, value, now);
    }

    /// Record every sequence number in `start..=end` as received.
    pub fn add_range(&mut self, start: u64, end: u64, now: DateTime<Utc>) {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };

        let Some((min, max)) = self.bounds else {
            self.bounds = Some((start, end));
            return;
        };

        if start > max && start - max > 1 {
            self.insert(max + 1, start - 1, now);
        }
        if end < min && min - end > 1 {
            self.insert(end + 1, min - 1, now);
        }
        self.bounds = Some((min.min(start), max.max(end)));
        self.fill(start, end, now);
    }

    fn insert(&mut self, start: u64, end: u64, modified: DateTime<Utc>) {
        self.gaps.insert(
            start,
            Gap {
                start,
                end,
                modified,
            },
        );
    }

    /// Remove `start..=end` from every gap it overlaps, splitting where needed.
    fn fill(&mut self, start: u64, end: u64, now: DateTime<Utc>) {
        let overlapping: Vec<Gap> = self
            .gaps
            .range(..=end)
            .map(|(_, gap)| *gap)
            .filter(|gap| gap.end >= start)
            .collect();

        for gap in overlapping {
            self.gaps.remove(&gap.start);
            if gap.start < start {
                self.insert(gap.start, start - 1, now);
            }
            if gap.end > end {
                self.insert(end + 1, gap.end, now);
            }
        }
    }

    /// Drop gaps that can no longer be retransmitted because the station has
    /// moved its lowest available sequence number past them.
    pub fn trim_below(&mut self, lowest: u64, now: DateTime<Utc>) {
        if lowest == 0 {
            return;
        }
        self.fill(0, lowest - 1, now);
    }

    /// Drop gaps whose last change is older than `cutoff`. Returns how many were dropped.
    pub fn remove_gaps_modified_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.gaps.len();
        self.gaps.retain(|_, gap| gap.modified >= cutoff);
        before - self.gaps.len()
    }

    /// Forget everything, as after a station restarts its numbering.
    pub fn reset(&mut self) {
        self.bounds = None;
        self.gaps.clear();
    }

    pub fn lowest(&self) -> Option<u64> {
        self.bounds.map(|(min, _)| min)
    }

    pub fn highest(&self) -> Option<u64> {
        self.bounds.map(|(_, max)| max)
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    pub fn gap_count(&self) -> usize {
        self.gaps.len()
    }

    pub fn gaps(&self) -> impl Iterator<Item = &Gap> + '_ {
        self.gaps.values()
    }

    /// Whether `value` falls inside a known gap.
    pub fn is_missing(&self, value: u64) -> bool {
        self.gaps
            .range(..=value)
            .next_back()
            .is_some_and(|(_, gap)| gap.end >= value)
    }

    /// Current bounds and gaps, or `None` before anything has been received.
    pub fn snapshot(&self) -> Option<GapSnapshot> {
        let (lowest, highest) = self.bounds?;
        Some(GapSnapshot {
            lowest,
            highest,
            gaps: self.gaps.values().map(Gap::range).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn ranges(list: &GapList) -> Vec<(u64, u64)> {
        list.gaps().map(|g| (g.start, g.end)).collect()
    }

    #[test]
    fn single_missing_value() {
        let mut list = GapList::new();
        for seq in [1, 2, 4, 5] {
            list.add(seq, t0());
        }

        assert_eq!(ranges(&list), vec![(3, 3)]);
        let snap = list.snapshot().unwrap();
        assert_eq!(snap.lowest, 1);
        assert_eq!(snap.highest, 5);
        assert_eq!(snap.gaps, vec![SequenceRange::single(3)]);
    }

    #[test]
    fn empty_list_has_no_snapshot() {
        let list = GapList::new();
        assert!(list.is_empty());
        assert_eq!(list.snapshot(), None);
        assert_eq!(list.lowest(), None);
    }

    #[test]
    fn late_arrival_splits_gap() {
        let mut list = GapList::new();
        list.add(10, t0());
        list.add(20, t0());
        assert_eq!(ranges(&list), vec![(11, 19)]);

        list.add(15, t0() + Duration::seconds(1));
        assert_eq!(ranges(&list), vec![(11, 14), (16, 19)]);
        assert!(list
            .gaps()
            .all(|g| g.modified == t0() + Duration::seconds(1)));

        list.add(11, t0());
        list.add(19, t0());
        assert_eq!(ranges(&list), vec![(12, 14), (16, 18)]);
        assert!(list.is_missing(13));
        assert!(!list.is_missing(15));
    }

    #[test]
    fn filling_last_value_removes_gap() {
        let mut list = GapList::new();
        list.add(1, t0());
        list.add(3, t0());
        list.add(2, t0());
        assert_eq!(list.gap_count(), 0);
        assert_eq!((list.lowest(), list.highest()), (Some(1), Some(3)));
    }

    #[test]
    fn value_below_minimum_opens_gap() {
        let mut list = GapList::new();
        list.add(10, t0());
        list.add(7, t0());
        assert_eq!(ranges(&list), vec![(8, 9)]);
        assert_eq!(list.lowest(), Some(7));
    }

    #[test]
    fn duplicates_change_nothing() {
        let mut list = GapList::new();
        list.add(5, t0());
        list.add(8, t0());
        let before = list.clone();
        list.add(5, t0() + Duration::hours(1));
        list.add(8, t0() + Duration::hours(1));
        assert_eq!(list, before);
    }

    #[test]
    fn range_covers_several_gaps() {
        let mut list = GapList::new();
        for seq in [1, 3, 5, 7, 9] {
            list.add(seq, t0());
        }
        assert_eq!(list.gap_count(), 4);

        list.add_range(2, 6, t0());
        assert_eq!(ranges(&list), vec![(8, 8)]);

        list.add_range(12, 11, t0());
        assert_eq!(ranges(&list), vec![(8, 8), (10, 10)]);
        assert_eq!(list.highest(), Some(12));
    }

    #[test]
    fn trim_below_drops_unrecoverable_gaps() {
        let mut list = GapList::new();
        for seq in [1, 5, 10] {
            list.add(seq, t0());
        }
        assert_eq!(ranges(&list), vec![(2, 4), (6, 9)]);

        list.trim_below(7, t0());
        assert_eq!(ranges(&list), vec![(7, 9)]);

        list.trim_below(0, t0());
        assert_eq!(ranges(&list), vec![(7, 9)]);
    }

    #[test]
    fn expired_gaps_are_swept() {
        let mut list = GapList::new();
        list.add(1, t0());
        list.add(3, t0());
        list.add(10, t0() + Duration::days(2));

        let removed = list.remove_gaps_modified_before(t0() + Duration::days(1));
        assert_eq!(removed, 1);
        assert_eq!(ranges(&list), vec![(4, 9)]);
    }

    #[test]
    fn reset_clears_bounds() {
        let mut list = GapList::new();
        list.add(1, t0());
        list.add(4, t0());
        list.reset();
        assert!(list.is_empty());
        assert_eq!(list.gap_count(), 0);

        list.add(100, t0());
        assert_eq!(list.snapshot().unwrap().lowest, 100);
    }

    #[test]
    fn handles_extreme_values() {
        let mut list = GapList::new();
        list.add(u64::MAX, t0());
        list.add(0, t0());
        assert_eq!(ranges(&list), vec![(1, u64::MAX - 1)]);
    }
}
