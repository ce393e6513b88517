//! In-memory text surface with tracked ranges.
//!
//! [`TextBuffer`] stores text in a [`Rope`] (O(log n) line access and editing) and its tracked
//! ranges in a [`RangeTree`]. It is both the default scratch surface used by conversions and a
//! headless stand-in for a live editor.

use crate::decorations::{Position, RangeEdit, RangeId, RangeSpec, StyleTag, TextRange};
use crate::delta::{ChangeBatch, ContentChange};
use crate::error::BufferError;
use crate::intervals::{RangeTree, TrackedInterval};
use crate::model::Markup;
use crate::provider::TrackedRangeProvider;
use ropey::Rope;

/// Rope-backed text with tracked ranges.
pub struct TextBuffer {
    rope: Rope,
    ranges: RangeTree,
    next_range_id: u64,
    version: u64,
}

impl TextBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::from_text("")
    }

    /// Create a buffer holding `text`.
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            ranges: RangeTree::new(),
            next_range_id: 1,
            version: 0,
        }
    }

    /// Number of edit batches applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of tracked ranges.
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Number of logical lines.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Markup attached to a range at creation.
    pub fn attached(&self, id: RangeId) -> Option<&Markup> {
        self.ranges.get(id).and_then(|i| i.attached.as_ref())
    }

    fn check_range(&self, range: TextRange) -> Result<(), BufferError> {
        let len = self.rope.len_chars();
        if range.end > len {
            return Err(BufferError::OutOfBounds { range, len });
        }
        Ok(())
    }
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackedRangeProvider for TextBuffer {
    fn create_ranges(&mut self, specs: Vec<RangeSpec>) -> Result<Vec<RangeId>, BufferError> {
        for spec in &specs {
            self.check_range(spec.range)?;
        }

        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = RangeId(self.next_range_id);
            self.next_range_id += 1;
            self.ranges.insert(TrackedInterval {
                id,
                range: spec.range,
                style: spec.style,
                attached: spec.attached,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    fn range(&self, id: RangeId) -> Option<TextRange> {
        self.ranges.get(id).map(|i| i.range)
    }

    fn content(&self, range: TextRange) -> String {
        let len = self.rope.len_chars();
        let end = range.end.min(len);
        let start = range.start.min(end);
        self.rope.slice(start..end).to_string()
    }

    fn apply_edits(&mut self, edits: &[RangeEdit]) -> Result<ChangeBatch, BufferError> {
        if edits.is_empty() {
            return Ok(ChangeBatch {
                version: self.version,
                changes: Vec::new(),
            });
        }

        let mut ordered: Vec<&RangeEdit> = edits.iter().collect();
        ordered.sort_by_key(|edit| (edit.range.start, edit.range.end));

        for edit in &ordered {
            self.check_range(edit.range)?;
        }
        for pair in ordered.windows(2) {
            let (first, second) = (pair[0].range, pair[1].range);
            if first.end > second.start || first.start == second.start {
                return Err(BufferError::OverlappingEdits { first, second });
            }
        }

        let changes: Vec<ContentChange> = ordered
            .iter()
            .map(|edit| ContentChange {
                range: edit.range,
                start: self.char_to_position(edit.range.start),
                end: self.char_to_position(edit.range.end),
                text: edit.text.clone(),
            })
            .collect();

        // Apply back to front so pre-batch offsets of earlier edits stay valid.
        for edit in ordered.iter().rev() {
            let TextRange { start, end } = edit.range;
            if start < end {
                self.rope.remove(start..end);
            }
            if !edit.text.is_empty() {
                self.rope.insert(start, &edit.text);
            }
            self.ranges
                .apply_edit(start, end, edit.text.chars().count());
        }

        self.version += 1;
        Ok(ChangeBatch {
            version: self.version,
            changes,
        })
    }

    fn remove_ranges(&mut self, ids: &[RangeId]) {
        for id in ids {
            self.ranges.remove(*id);
        }
    }

    fn ranges_in(&self, region: TextRange) -> Vec<(RangeId, StyleTag)> {
        self.ranges
            .query_range(region)
            .into_iter()
            .map(|i| (i.id, i.style))
            .collect()
    }

    fn text(&self) -> String {
        self.rope.to_string()
    }

    fn set_text(&mut self, text: &str) {
        self.rope = Rope::from_str(text);
        self.ranges.clear();
        self.version += 1;
    }

    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn char_to_position(&self, offset: usize) -> Position {
        let offset = offset.min(self.rope.len_chars());
        let line = self.rope.char_to_line(offset);
        Position::new(line, offset - self.rope.line_to_char(line))
    }

    fn position_to_char(&self, position: Position) -> Option<usize> {
        let line = self.line_range(position.line)?;
        (position.column <= line.len()).then_some(line.start + position.column)
    }

    fn line_range(&self, line: usize) -> Option<TextRange> {
        if line >= self.rope.len_lines() {
            return None;
        }

        let start = self.rope.line_to_char(line);
        let mut end = if line + 1 < self.rope.len_lines() {
            // Exclude the '\n' terminator.
            self.rope.line_to_char(line + 1) - 1
        } else {
            self.rope.len_chars()
        };
        if end > start && self.rope.char(end - 1) == '\r' {
            end -= 1;
        }
        Some(TextRange::new(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_spec(start: usize, end: usize) -> RangeSpec {
        RangeSpec::attached(
            TextRange::new(start, end),
            StyleTag::AssetTable,
            Markup::new("m1"),
        )
    }

    #[test]
    fn test_ranges_follow_edits() {
        let mut buffer = TextBuffer::from_text("select * from \"table_1\"");
        let ids = buffer.create_ranges(vec![table_spec(14, 23)]).unwrap();
        assert_eq!(buffer.range_content(ids[0]).unwrap(), "\"table_1\"");

        buffer
            .apply_edits(&[RangeEdit::insert(0, "-- comment\n")])
            .unwrap();
        assert_eq!(buffer.range_content(ids[0]).unwrap(), "\"table_1\"");
        assert_eq!(buffer.attached(ids[0]), Some(&Markup::new("m1")));
    }

    #[test]
    fn test_batch_is_addressed_in_pre_batch_coordinates() {
        let mut buffer = TextBuffer::from_text("aaa bbb ccc");
        let batch = buffer
            .apply_edits(&[
                RangeEdit::new(TextRange::new(8, 11), "C"),
                RangeEdit::new(TextRange::new(0, 3), "AAAA"),
            ])
            .unwrap();

        assert_eq!(buffer.text(), "AAAA bbb C");
        assert_eq!(batch.changes.len(), 2);
        assert_eq!(batch.changes[0].range, TextRange::new(0, 3));
        assert_eq!(batch.changes[1].range, TextRange::new(8, 11));
        assert_eq!(batch.version, 1);
    }

    #[test]
    fn test_rejected_batch_leaves_buffer_untouched() {
        let mut buffer = TextBuffer::from_text("hello");
        let overlap = buffer.apply_edits(&[
            RangeEdit::new(TextRange::new(0, 3), "x"),
            RangeEdit::new(TextRange::new(2, 4), "y"),
        ]);
        assert!(matches!(overlap, Err(BufferError::OverlappingEdits { .. })));

        let out_of_bounds = buffer.apply_edits(&[RangeEdit::insert(6, "!")]);
        assert!(matches!(
            out_of_bounds,
            Err(BufferError::OutOfBounds { len: 5, .. })
        ));
        assert_eq!(buffer.text(), "hello");
        assert_eq!(buffer.version(), 0);
    }

    #[test]
    fn test_positions_and_lines() {
        let buffer = TextBuffer::from_text("ab\r\ncd\n\nef");
        assert_eq!(buffer.line_count(), 4);
        assert_eq!(buffer.line_range(0), Some(TextRange::new(0, 2)));
        assert_eq!(buffer.line_range(1), Some(TextRange::new(4, 6)));
        assert_eq!(buffer.line_range(2), Some(TextRange::new(7, 7)));
        assert_eq!(buffer.line_range(3), Some(TextRange::new(8, 10)));
        assert_eq!(buffer.line_range(4), None);

        assert_eq!(buffer.char_to_position(5), Position::new(1, 1));
        assert_eq!(buffer.position_to_char(Position::new(3, 2)), Some(10));
        assert_eq!(buffer.position_to_char(Position::new(3, 3)), None);
    }

    #[test]
    fn test_only_line_feed_breaks_lines() {
        let buffer = TextBuffer::from_text("a\rb\u{2028}c\nd");
        assert_eq!(buffer.line_count(), 2);
        assert_eq!(buffer.line_range(0), Some(TextRange::new(0, 5)));
        assert_eq!(buffer.char_to_position(6), Position::new(1, 0));
    }

    #[test]
    fn test_set_text_drops_ranges() {
        let mut buffer = TextBuffer::from_text("\"table_1\"");
        let ids = buffer.create_ranges(vec![table_spec(0, 9)]).unwrap();
        buffer.set_text("other");
        assert!(buffer.range(ids[0]).is_none());
        assert_eq!(buffer.range_count(), 0);
    }

    #[test]
    fn test_create_ranges_is_atomic() {
        let mut buffer = TextBuffer::from_text("abc");
        let result = buffer.create_ranges(vec![table_spec(0, 1), table_spec(2, 9)]);
        assert!(result.is_err());
        assert_eq!(buffer.range_count(), 0);
    }
}
