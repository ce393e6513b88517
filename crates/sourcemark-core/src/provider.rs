//! The tracked-range capability consumed by the engine.
//!
//! The live editing surface implements [`TrackedRangeProvider`]; conversions run against a
//! private scratch provider obtained from a [`ScratchFactory`], so a conversion never mutates
//! the live document.

use crate::buffer::TextBuffer;
use crate::decorations::{Position, RangeEdit, RangeId, RangeSpec, StyleTag, TextRange};
use crate::delta::ChangeBatch;
use crate::error::{BufferError, ConvertError};
use std::time::Duration;

/// A text surface exposing ranges that relocate automatically across edits.
pub trait TrackedRangeProvider {
    /// Create one tracked range per spec, returning their ids in spec order.
    fn create_ranges(&mut self, specs: Vec<RangeSpec>) -> Result<Vec<RangeId>, BufferError>;

    /// Current position of a range, or `None` once it has been removed.
    fn range(&self, id: RangeId) -> Option<TextRange>;

    /// Text covered by `range` (clamped to the document).
    fn content(&self, range: TextRange) -> String;

    /// Apply a batch of replacements addressed in pre-batch coordinates.
    ///
    /// The batch is rejected as a whole when any edit is out of bounds or two edits overlap.
    fn apply_edits(&mut self, edits: &[RangeEdit]) -> Result<ChangeBatch, BufferError>;

    /// Release ranges. Unknown ids are ignored.
    fn remove_ranges(&mut self, ids: &[RangeId]);

    /// Ids and styles of every range touching `region`.
    fn ranges_in(&self, region: TextRange) -> Vec<(RangeId, StyleTag)>;

    /// Full document text.
    fn text(&self) -> String;

    /// Replace the whole document. Every tracked range is dropped.
    fn set_text(&mut self, text: &str);

    /// Document length in characters.
    fn len_chars(&self) -> usize;

    /// Logical position of a character offset (clamped to the document).
    fn char_to_position(&self, offset: usize) -> Position;

    /// Character offset of a logical position, or `None` if it does not exist.
    fn position_to_char(&self, position: Position) -> Option<usize>;

    /// Span of one line, excluding its line terminator.
    fn line_range(&self, line: usize) -> Option<TextRange>;

    /// Live text of a tracked range.
    fn range_content(&self, id: RangeId) -> Option<String> {
        self.range(id).map(|range| self.content(range))
    }
}

/// Source of private scratch surfaces used for one conversion call.
pub trait ScratchFactory {
    /// The scratch surface type.
    type Buffer: TrackedRangeProvider;

    /// Open a scratch surface holding `text`.
    ///
    /// Fails with [`ConvertError::ConversionTimeout`] if the surface is not ready within
    /// `timeout`.
    fn open(&mut self, text: &str, timeout: Duration) -> Result<Self::Buffer, ConvertError>;
}

/// Scratch surfaces backed by an in-memory [`TextBuffer`]; always ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryScratch;

impl ScratchFactory for InMemoryScratch {
    type Buffer = TextBuffer;

    fn open(&mut self, text: &str, _timeout: Duration) -> Result<TextBuffer, ConvertError> {
        Ok(TextBuffer::from_text(text))
    }
}
