use std::{ops::Index, slice::Iter};

/// Represent a range of time, from a start to an end, generally in seconds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    start: f64,
    end: f64,
}

impl TimeRange {
    /// Returns the start time of the range
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Returns the end time of the range
    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Abstracts non-contiguous chronological ranges of time, generally expressed in seconds.
///
/// Ranges are always kept sorted, non-overlapping and merged when they touch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    /// Create a new empty `TimeRanges` object
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a `TimeRanges` object from `(start, end)` tuples in any order, merging them.
    ///
    /// Empty or inverted tuples are ignored.
    pub fn from_ranges(ranges: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut ret = Self::new();
        for (start, end) in ranges {
            ret.add(start, end);
        }
        ret
    }

    /// Add a range of time to that `TimeRanges` object, merging it with the ranges that are
    /// already there.
    pub fn add(&mut self, start: f64, end: f64) {
        if end <= start || start.is_nan() || end.is_nan() {
            return;
        }
        let first_idx = self.ranges.partition_point(|r| r.end < start);
        let mut new_range = TimeRange { start, end };
        let mut last_idx = first_idx;
        while last_idx < self.ranges.len() && self.ranges[last_idx].start <= new_range.end {
            let merged = &self.ranges[last_idx];
            new_range.start = new_range.start.min(merged.start);
            new_range.end = new_range.end.max(merged.end);
            last_idx += 1;
        }
        self.ranges.splice(first_idx..last_idx, [new_range]);
    }

    /// Remove the `[start, end)` interval from these ranges, cutting ranges that straddle its
    /// bounds.
    pub fn remove_range(&mut self, start: f64, end: f64) {
        if end <= start || start.is_nan() || end.is_nan() {
            return;
        }
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for range in self.ranges.drain(..) {
            if range.end <= start || range.start >= end {
                kept.push(range);
                continue;
            }
            if range.start < start {
                kept.push(TimeRange {
                    start: range.start,
                    end: start,
                });
            }
            if range.end > end {
                kept.push(TimeRange {
                    start: end,
                    end: range.end,
                });
            }
        }
        self.ranges = kept;
    }

    /// Returns the number of non-contiguous ranges in this `TimeRanges` object
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the starting time of the range whose index is given in argument.
    ///
    /// Returns `None` if the given index is superior or equal to the number of actual ranges.
    pub fn start(&self, idx: usize) -> Option<f64> {
        self.ranges.get(idx).map(|r| r.start)
    }

    /// Returns the ending time of the range whose index is given in argument.
    ///
    /// Returns `None` if the given index is superior or equal to the number of actual ranges.
    pub fn end(&self, idx: usize) -> Option<f64> {
        self.ranges.get(idx).map(|r| r.end)
    }

    /// Returns the range containing the given position.
    ///
    /// Returns `None` if no range in this `TimeRanges` object contains it.
    pub fn range_for(&self, pos: f64) -> Option<&TimeRange> {
        self.ranges.iter().find(|r| pos >= r.start && pos < r.end)
    }

    pub fn contains(&self, pos: f64) -> bool {
        self.range_for(pos).is_some()
    }

    /// Returns `true` if the whole `[start, end)` interval is inside a single range.
    pub fn covers(&self, start: f64, end: f64) -> bool {
        self.ranges
            .iter()
            .any(|r| r.start <= start && r.end >= end)
    }

    /// Sum of the duration of every range.
    pub fn total_duration(&self) -> f64 {
        self.ranges.iter().map(|r| r.duration()).sum()
    }

    /// Holes between consecutive ranges, as `(start, end)` tuples.
    pub fn gaps(&self) -> Vec<(f64, f64)> {
        self.ranges
            .windows(2)
            .map(|w| (w[0].end, w[1].start))
            .collect()
    }

    /// Smallest interval containing every part of `[start, end)` that is inside these ranges.
    ///
    /// Returns `None` if `[start, end)` does not intersect any range.
    pub fn intersection_hull(&self, start: f64, end: f64) -> Option<(f64, f64)> {
        let mut hull: Option<(f64, f64)> = None;
        for r in &self.ranges {
            let inter_start = r.start.max(start);
            let inter_end = r.end.min(end);
            if inter_end > inter_start {
                hull = Some(match hull {
                    None => (inter_start, inter_end),
                    Some((s, e)) => (s.min(inter_start), e.max(inter_end)),
                });
            }
        }
        hull
    }

    pub fn to_vec(&self) -> Vec<(f64, f64)> {
        self.ranges.iter().map(|r| (r.start, r.end)).collect()
    }

    pub fn iter(&self) -> Iter<'_, TimeRange> {
        self.ranges.iter()
    }

    pub fn clear(&mut self) {
        self.ranges.clear()
    }
}

impl Index<usize> for TimeRanges {
    type Output = TimeRange;
    fn index(&self, index: usize) -> &Self::Output {
        &self.ranges[index]
    }
}

impl<'a> IntoIterator for &'a TimeRanges {
    type Item = &'a TimeRange;
    type IntoIter = Iter<'a, TimeRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_merges_overlapping_and_touching() {
        let mut ranges = TimeRanges::new();
        ranges.add(10., 12.);
        ranges.add(0., 2.);
        ranges.add(4., 6.);
        assert_eq!(ranges.to_vec(), vec![(0., 2.), (4., 6.), (10., 12.)]);
        ranges.add(2., 4.);
        assert_eq!(ranges.to_vec(), vec![(0., 6.), (10., 12.)]);
        ranges.add(5., 11.);
        assert_eq!(ranges.to_vec(), vec![(0., 12.)]);
        ranges.add(3., 3.);
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn test_remove_range() {
        let mut ranges = TimeRanges::from_ranges([(0., 10.), (20., 30.)]);
        ranges.remove_range(5., 25.);
        assert_eq!(ranges.to_vec(), vec![(0., 5.), (25., 30.)]);
        ranges.remove_range(0., f64::INFINITY);
        assert!(ranges.is_empty());
    }

    #[test]
    fn test_queries() {
        let ranges = TimeRanges::from_ranges([(0., 4.), (4.2, 8.), (20., 22.)]);
        assert!(ranges.contains(0.));
        assert!(!ranges.contains(4.1));
        assert!(!ranges.contains(8.));
        assert!(ranges.covers(5., 8.));
        assert!(!ranges.covers(3., 5.));
        assert_eq!(ranges.range_for(21.).map(|r| r.start()), Some(20.));
        let gaps = ranges.gaps();
        assert_eq!(gaps.len(), 2);
        assert!((gaps[0].0 - 4.).abs() < 1e-9 && (gaps[0].1 - 4.2).abs() < 1e-9);
        assert!((ranges.total_duration() - 9.8).abs() < 1e-9);
        assert_eq!(ranges.intersection_hull(2., 6.), Some((2., 6.)));
        assert_eq!(ranges.intersection_hull(9., 19.), None);
    }
}
