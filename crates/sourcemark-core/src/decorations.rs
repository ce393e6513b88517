//! Tracked-range data model.
//!
//! A tracked range is a half-open character-offset span that the hosting surface relocates as
//! the text around it is edited. Ranges carry a [`StyleTag`] telling the host how to paint them
//! and, optionally, the markup of the reference they were created for (the host's "attached
//! data", used e.g. for click handling).

use crate::model::Markup;

/// Opaque identifier of a tracked range inside one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RangeId(pub(crate) u64);

impl RangeId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A half-open character-offset range (`start..end`) in the document.
///
/// Offsets are Unicode scalar values (`char`) from the start of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextRange {
    /// Range start offset (inclusive).
    pub start: usize,
    /// Range end offset (exclusive).
    pub end: usize,
}

impl TextRange {
    /// Create a new range. `start` and `end` are normalized so that `start <= end`.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// An empty range anchored at `offset`.
    pub fn empty(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the range covers no characters.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if the range contains a specific position.
    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Strict overlap: the ranges share at least one character.
    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Overlap or adjacency: the ranges share a character or a boundary.
    pub fn touches(&self, other: &TextRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Translate the range by `delta` characters.
    pub fn offset_by(&self, delta: usize) -> Self {
        Self {
            start: self.start + delta,
            end: self.end + delta,
        }
    }
}

/// Logical coordinates (0-based line, column in characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    /// Logical line index.
    pub line: usize,
    /// Column in characters within the line.
    pub column: usize,
}

impl Position {
    /// Create a new position.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// How a tracked range is painted by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleTag {
    /// A table reference.
    AssetTable,
    /// A time-series asset name (the whole reference for multi-series references).
    TimeseriesTag,
    /// The container span of a single time-series reference (`"asset"."attribute"`).
    TimeseriesContainer,
    /// The separator between asset and attribute.
    TimeseriesDot,
    /// The attribute part of a single time-series reference.
    AttributeTag,
    /// Internal range used only while converting; never painted.
    Bookkeeping,
}

impl StyleTag {
    /// Whether ranges with this tag belong to a reference.
    pub fn is_reference_bearing(self) -> bool {
        !matches!(self, StyleTag::Bookkeeping)
    }

    /// Class name a host can use to paint the range.
    pub fn class_name(self) -> &'static str {
        match self {
            StyleTag::AssetTable => "sourcemark-asset-table-tag",
            StyleTag::TimeseriesTag => "sourcemark-asset-timeseries-tag",
            StyleTag::TimeseriesContainer => "sourcemark-asset-timeseries-container",
            StyleTag::TimeseriesDot => "sourcemark-asset-timeseries-dot",
            StyleTag::AttributeTag => "sourcemark-asset-attribute-tag",
            StyleTag::Bookkeeping => "",
        }
    }
}

/// A request to create one tracked range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpec {
    /// Initial position.
    pub range: TextRange,
    /// Paint style.
    pub style: StyleTag,
    /// Markup of the reference this range is attached to, if any.
    pub attached: Option<Markup>,
}

impl RangeSpec {
    /// A range attached to a reference.
    pub fn attached(range: TextRange, style: StyleTag, markup: Markup) -> Self {
        Self {
            range,
            style,
            attached: Some(markup),
        }
    }

    /// An internal range used to follow a span through a sequence of edits.
    pub fn bookkeeping(range: TextRange) -> Self {
        Self {
            range,
            style: StyleTag::Bookkeeping,
            attached: None,
        }
    }
}

/// A replacement of `range` (pre-edit coordinates) with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeEdit {
    /// Range to replace.
    pub range: TextRange,
    /// Replacement text (may be empty, may contain newlines).
    pub text: String,
}

impl RangeEdit {
    /// Create a replacement edit.
    pub fn new(range: TextRange, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    /// Insert `text` at `offset`.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(TextRange::empty(offset), text)
    }

    /// Delete `range`.
    pub fn delete(range: TextRange) -> Self {
        Self::new(range, String::new())
    }
}
