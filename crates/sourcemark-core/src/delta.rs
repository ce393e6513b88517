//! Structured text change events.
//!
//! Every edit applied to a [`TrackedRangeProvider`](crate::TrackedRangeProvider) is reported as
//! a [`ChangeBatch`]: the list of replacements it performed, addressed in **pre-batch**
//! coordinates (character offsets plus logical positions), sorted by start offset.

use crate::decorations::{Position, TextRange};

/// One replacement inside a [`ChangeBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    /// Replaced range, in pre-batch character offsets.
    pub range: TextRange,
    /// Logical position of `range.start` before the batch.
    pub start: Position,
    /// Logical position of `range.end` before the batch.
    pub end: Position,
    /// Inserted text.
    pub text: String,
}

impl ContentChange {
    /// Length of the inserted text in characters.
    pub fn inserted_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Number of characters replaced.
    pub fn removed_len(&self) -> usize {
        self.range.len()
    }

    /// Number of lines the inserted text spans.
    pub fn inserted_line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    /// Number of lines the replaced range spanned.
    pub fn replaced_line_count(&self) -> usize {
        self.end.line - self.start.line + 1
    }

    /// Net change in document length.
    pub fn delta(&self) -> isize {
        self.inserted_len() as isize - self.removed_len() as isize
    }
}

/// Which side an offset sticks to when text is inserted exactly at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Stay before inserted text.
    Left,
    /// Move after inserted text.
    Right,
}

/// All replacements produced by one edit call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeBatch {
    /// Provider version after the batch was applied.
    pub version: u64,
    /// Non-overlapping replacements sorted by ascending `range.start`.
    pub changes: Vec<ContentChange>,
}

impl ChangeBatch {
    /// Returns `true` if the batch contains no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Relocate a pre-batch offset into post-batch coordinates.
    ///
    /// Offsets inside a replaced span land on the start (`Bias::Left`) or the end
    /// (`Bias::Right`) of the inserted text.
    pub fn map_offset(&self, offset: usize, bias: Bias) -> usize {
        let mut shift = 0isize;
        for change in &self.changes {
            let TextRange { start, end } = change.range;
            let before = match bias {
                Bias::Left => offset <= start,
                Bias::Right => offset < start,
            };
            if before {
                break;
            }
            if offset >= end {
                shift += change.delta();
                continue;
            }
            let landed = match bias {
                Bias::Left => start,
                Bias::Right => start + change.inserted_len(),
            };
            return (landed as isize + shift).max(0) as usize;
        }
        (offset as isize + shift).max(0) as usize
    }

    /// Relocate a pre-batch range into post-batch coordinates, widening over inserted text.
    pub fn map_range(&self, range: TextRange) -> TextRange {
        TextRange::new(
            self.map_offset(range.start, Bias::Left),
            self.map_offset(range.end, Bias::Right),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(start: usize, end: usize, text: &str) -> ContentChange {
        ContentChange {
            range: TextRange::new(start, end),
            start: Position::new(0, start),
            end: Position::new(0, end),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_change_lengths() {
        let c = ContentChange {
            range: TextRange::new(2, 5),
            start: Position::new(0, 2),
            end: Position::new(1, 1),
            text: "a\nb\nc".to_string(),
        };
        assert_eq!(c.inserted_len(), 5);
        assert_eq!(c.removed_len(), 3);
        assert_eq!(c.inserted_line_count(), 3);
        assert_eq!(c.replaced_line_count(), 2);
        assert_eq!(c.delta(), 2);
    }

    #[test]
    fn test_map_offset_across_changes() {
        let batch = ChangeBatch {
            version: 1,
            changes: vec![change(2, 4, "xyz"), change(10, 10, "ab")],
        };

        assert_eq!(batch.map_offset(1, Bias::Left), 1);
        assert_eq!(batch.map_offset(3, Bias::Left), 2);
        assert_eq!(batch.map_offset(3, Bias::Right), 5);
        assert_eq!(batch.map_offset(6, Bias::Left), 7);
        assert_eq!(batch.map_offset(10, Bias::Left), 11);
        assert_eq!(batch.map_offset(10, Bias::Right), 13);
        assert_eq!(batch.map_offset(12, Bias::Left), 15);
    }

    #[test]
    fn test_map_range_widens_over_insertion() {
        let batch = ChangeBatch {
            version: 1,
            changes: vec![change(4, 4, "123")],
        };
        assert_eq!(batch.map_range(TextRange::new(2, 4)), TextRange::new(2, 7));
        assert_eq!(batch.map_range(TextRange::new(4, 6)), TextRange::new(4, 9));
    }
}
