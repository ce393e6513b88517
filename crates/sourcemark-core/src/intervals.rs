//! Tracked-range storage.
//!
//! Uses a sorted vector with a prefix-max-end array so region queries stay O(log n + k) even
//! with many ranges, and relocates every range when the text is edited.

use crate::decorations::{RangeId, StyleTag, TextRange};
use crate::model::Markup;
use std::collections::HashMap;

/// One stored range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedInterval {
    /// Range id.
    pub id: RangeId,
    /// Current position.
    pub range: TextRange,
    /// Paint style.
    pub style: StyleTag,
    /// Attached reference markup.
    pub attached: Option<Markup>,
}

/// Relocate `range` across the replacement of `[start, end)` with `inserted` characters.
///
/// - an edit replacing exactly the range resizes it to the replacement text
/// - edits at or before the range start shift it
/// - insertions at the range end never grow it
/// - edits inside the range resize it
/// - edits swallowing the range collapse it to an empty range at `start`
/// - partial overlaps keep the part of the range that survives
pub(crate) fn relocate(range: TextRange, start: usize, end: usize, inserted: usize) -> TextRange {
    let removed = end - start;
    let shift = |pos: usize| pos - removed + inserted;

    if start == range.start && end == range.end {
        return TextRange::new(start, start + inserted);
    }
    if end <= range.start {
        return TextRange::new(shift(range.start), shift(range.end));
    }
    if start >= range.end {
        return range;
    }
    if start <= range.start && end >= range.end {
        return TextRange::empty(start);
    }
    if start >= range.start && end <= range.end {
        return TextRange::new(range.start, shift(range.end));
    }
    if start < range.start {
        // Edit swallowed the head of the range.
        return TextRange::new(start + inserted, shift(range.end));
    }
    // Edit swallowed the tail of the range.
    TextRange::new(range.start, start)
}

/// Sorted store of tracked ranges.
pub struct RangeTree {
    /// Ranges kept sorted by `(start, id)`.
    intervals: Vec<TrackedInterval>,
    /// `prefix_max_end[i] = max(intervals[0..=i].range.end)`, used to prune region scans.
    prefix_max_end: Vec<usize>,
    /// Slot of each id in `intervals`.
    slots: HashMap<RangeId, usize>,
}

impl RangeTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            intervals: Vec::new(),
            prefix_max_end: Vec::new(),
            slots: HashMap::new(),
        }
    }

    fn rebuild_index_from(&mut self, start_idx: usize) {
        self.prefix_max_end.resize(self.intervals.len(), 0);

        let mut max_end = if start_idx == 0 {
            0
        } else {
            self.prefix_max_end[start_idx - 1]
        };

        for (idx, interval) in self.intervals.iter().enumerate().skip(start_idx) {
            max_end = max_end.max(interval.range.end);
            self.prefix_max_end[idx] = max_end;
            self.slots.insert(interval.id, idx);
        }
    }

    /// Insert a range.
    pub fn insert(&mut self, interval: TrackedInterval) {
        let key = (interval.range.start, interval.id);
        let pos = self
            .intervals
            .partition_point(|i| (i.range.start, i.id) < key);

        self.intervals.insert(pos, interval);
        self.rebuild_index_from(pos);
    }

    /// Remove a range by id.
    pub fn remove(&mut self, id: RangeId) -> Option<TrackedInterval> {
        let pos = self.slots.remove(&id)?;
        let removed = self.intervals.remove(pos);
        self.rebuild_index_from(pos);
        Some(removed)
    }

    /// Look up a range by id.
    pub fn get(&self, id: RangeId) -> Option<&TrackedInterval> {
        self.slots.get(&id).map(|&slot| &self.intervals[slot])
    }

    /// All ranges touching `region` (sharing a character or a boundary with it).
    pub fn query_range(&self, region: TextRange) -> Vec<&TrackedInterval> {
        if self.intervals.is_empty() {
            return Vec::new();
        }

        // Every candidate starts at or before the region end.
        let search_end = self
            .intervals
            .partition_point(|i| i.range.start <= region.end);
        if search_end == 0 {
            return Vec::new();
        }

        // Expand backward from the first range starting inside the region until
        // `prefix_max_end` shows nothing earlier can reach the region start.
        let mut scan_start = self
            .intervals
            .partition_point(|i| i.range.start < region.start)
            .min(search_end);
        while scan_start > 0 && self.prefix_max_end[scan_start - 1] >= region.start {
            scan_start -= 1;
        }

        self.intervals[scan_start..search_end]
            .iter()
            .filter(|interval| interval.range.touches(&region))
            .collect()
    }

    /// Relocate every range across the replacement of `[start, end)` with `inserted` chars.
    pub fn apply_edit(&mut self, start: usize, end: usize, inserted: usize) {
        for interval in &mut self.intervals {
            interval.range = relocate(interval.range, start, end, inserted);
        }
        self.intervals.sort_by_key(|i| (i.range.start, i.id));
        self.rebuild_index_from(0);
    }

    /// Iterate over all ranges in position order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedInterval> {
        self.intervals.iter()
    }

    /// Remove every range.
    pub fn clear(&mut self) {
        self.intervals.clear();
        self.prefix_max_end.clear();
        self.slots.clear();
    }

    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl Default for RangeTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(id: u64, start: usize, end: usize) -> TrackedInterval {
        TrackedInterval {
            id: RangeId(id),
            range: TextRange::new(start, end),
            style: StyleTag::AssetTable,
            attached: None,
        }
    }

    #[test]
    fn test_relocate_exact_cover_resizes() {
        let range = TextRange::new(5, 10);
        assert_eq!(relocate(range, 5, 10, 12), TextRange::new(5, 17));
        assert_eq!(relocate(range, 5, 10, 0), TextRange::new(5, 5));
    }

    #[test]
    fn test_relocate_edges_never_grow() {
        let range = TextRange::new(5, 10);
        // Insertion at the start shifts the range.
        assert_eq!(relocate(range, 5, 5, 3), TextRange::new(8, 13));
        // Insertion at the end leaves it alone.
        assert_eq!(relocate(range, 10, 10, 3), range);
    }

    #[test]
    fn test_relocate_inside_and_overlaps() {
        let range = TextRange::new(5, 10);
        assert_eq!(relocate(range, 6, 8, 1), TextRange::new(5, 9));
        assert_eq!(relocate(range, 2, 7, 1), TextRange::new(3, 6));
        assert_eq!(relocate(range, 8, 12, 4), TextRange::new(5, 8));
        assert_eq!(relocate(range, 2, 12, 4), TextRange::empty(2));
        assert_eq!(relocate(range, 0, 2, 0), TextRange::new(3, 8));
    }

    #[test]
    fn test_tree_insert_get_remove() {
        let mut tree = RangeTree::new();
        tree.insert(interval(1, 10, 20));
        tree.insert(interval(2, 5, 15));
        tree.insert(interval(3, 15, 25));

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get(RangeId(2)).unwrap().range, TextRange::new(5, 15));

        let removed = tree.remove(RangeId(1)).unwrap();
        assert_eq!(removed.range, TextRange::new(10, 20));
        assert!(tree.get(RangeId(1)).is_none());
        assert_eq!(tree.get(RangeId(3)).unwrap().range, TextRange::new(15, 25));
        assert!(tree.remove(RangeId(1)).is_none());
    }

    #[test]
    fn test_tree_query_range_includes_touching() {
        let mut tree = RangeTree::new();
        tree.insert(interval(1, 10, 20));
        tree.insert(interval(2, 25, 35));
        tree.insert(interval(3, 40, 50));

        let ids = |region: TextRange| {
            let mut ids: Vec<u64> = tree.query_range(region).iter().map(|i| i.id.0).collect();
            ids.sort();
            ids
        };

        assert_eq!(ids(TextRange::new(15, 30)), vec![1, 2]);
        assert_eq!(ids(TextRange::empty(20)), vec![1]);
        assert_eq!(ids(TextRange::new(21, 24)), Vec::<u64>::new());
        assert_eq!(ids(TextRange::new(0, 60)), vec![1, 2, 3]);
    }

    #[test]
    fn test_tree_query_prunes_with_long_range() {
        let mut tree = RangeTree::new();
        tree.insert(interval(1, 0, 100));
        for i in 0..50u64 {
            let start = 200 + (i as usize) * 4;
            tree.insert(interval(10 + i, start, start + 2));
        }

        let hits = tree.query_range(TextRange::new(50, 60));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, RangeId(1));
    }

    #[test]
    fn test_tree_apply_edit_keeps_slots_consistent() {
        let mut tree = RangeTree::new();
        tree.insert(interval(1, 10, 20));
        tree.insert(interval(2, 30, 40));

        tree.apply_edit(0, 25, 0);

        assert_eq!(tree.get(RangeId(1)).unwrap().range, TextRange::empty(0));
        assert_eq!(tree.get(RangeId(2)).unwrap().range, TextRange::new(5, 15));

        tree.apply_edit(5, 5, 3);
        assert_eq!(tree.get(RangeId(2)).unwrap().range, TextRange::new(8, 18));
    }
}
