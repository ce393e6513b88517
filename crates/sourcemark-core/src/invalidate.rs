//! Edit-driven invalidation of references.
//!
//! Every reference records the exact text of its primary range. After edits land, the
//! references whose ranges touch an edited region are re-read; any whose live text no longer
//! matches, or whose range is gone, is purged. The verdict depends only on each reference's
//! current versus expected content, so one pass over coalesced edits purges the same set as
//! one pass per edit.

use crate::decorations::TextRange;
use crate::delta::ChangeBatch;
use crate::model::{Markup, SourceReference};
use crate::provider::TrackedRangeProvider;
use crate::registry::ReferenceRegistry;
use serde::{Deserialize, Serialize};

/// Logging target for invalidation passes.
const LOG_TARGET: &str = "sourcemark::invalidate";

/// Which ranges of a reference are compared against their captured text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationPolicy {
    /// Only the primary range.
    #[default]
    PrimaryOnly,
    /// The primary range and every cosmetic sub-span.
    Strict,
}

/// Why a reference was purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeReason {
    /// The live text diverged from the expected text.
    Stale,
    /// The provider no longer knows the range.
    Unresolved,
}

/// One purged reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purge {
    /// The purged reference's markup.
    pub markup: Markup,
    /// Why it was purged.
    pub reason: PurgeReason,
}

/// Outcome of one invalidation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Number of references examined.
    pub checked: usize,
    /// References removed, in examination order.
    pub purged: Vec<Purge>,
}

/// Compares references against their expected content and purges the stale ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditInvalidator {
    policy: InvalidationPolicy,
}

impl EditInvalidator {
    /// Create an invalidator with the given policy.
    pub fn new(policy: InvalidationPolicy) -> Self {
        Self { policy }
    }

    /// Active policy.
    pub fn policy(&self) -> InvalidationPolicy {
        self.policy
    }

    /// Regions touched by `batch`, in post-batch coordinates of `provider`.
    ///
    /// Each region covers the inserted text. When a change inserts more lines than it
    /// replaced, its region extends through the end of the last inserted line, so content
    /// pushed into or out of a neighbouring range is still examined.
    pub fn affected_regions<P>(provider: &P, batch: &ChangeBatch) -> Vec<TextRange>
    where
        P: TrackedRangeProvider + ?Sized,
    {
        let len = provider.len_chars();
        let mut shift = 0isize;
        let mut regions = Vec::with_capacity(batch.changes.len());

        for change in &batch.changes {
            let start = ((change.range.start as isize + shift).max(0) as usize).min(len);
            let mut end = (start + change.inserted_len()).min(len);

            if change.inserted_line_count() > change.replaced_line_count() {
                let last_line = provider.char_to_position(end).line;
                if let Some(line) = provider.line_range(last_line) {
                    end = end.max(line.end);
                }
            }

            regions.push(TextRange::new(start, end));
            shift += change.delta();
        }
        regions
    }

    /// Run one pass over `regions` and purge stale references from `registry`.
    ///
    /// References whose primary range no longer resolves are purged as well, wherever they
    /// were. Never fails: problems are reported as purges.
    pub fn run<P>(
        &self,
        provider: &mut P,
        registry: &mut ReferenceRegistry,
        regions: &[TextRange],
    ) -> InvalidationReport
    where
        P: TrackedRangeProvider + ?Sized,
    {
        let mut candidates: Vec<Markup> = Vec::new();
        for region in regions {
            for (id, style) in provider.ranges_in(*region) {
                if !style.is_reference_bearing() {
                    continue;
                }
                if let Some(reference) = registry.lookup_by_range(id)
                    && !candidates.contains(&reference.markup)
                {
                    candidates.push(reference.markup.clone());
                }
            }
        }
        for reference in registry.iter() {
            if provider.range(reference.primary_range).is_none()
                && !candidates.contains(&reference.markup)
            {
                candidates.push(reference.markup.clone());
            }
        }

        let mut report = InvalidationReport {
            checked: candidates.len(),
            purged: Vec::new(),
        };
        for markup in candidates {
            let Some(reference) = registry.get(&markup) else {
                continue;
            };
            let Some(reason) = self.judge(&*provider, reference) else {
                continue;
            };

            log::debug!(target: LOG_TARGET, "purging '{}' ({:?})", markup, reason);
            registry.remove(&markup, provider);
            report.purged.push(Purge { markup, reason });
        }
        report
    }

    fn judge<P>(&self, provider: &P, reference: &SourceReference) -> Option<PurgeReason>
    where
        P: TrackedRangeProvider + ?Sized,
    {
        match provider.range_content(reference.primary_range) {
            None => return Some(PurgeReason::Unresolved),
            Some(content) if content != reference.expected_content => {
                return Some(PurgeReason::Stale);
            }
            Some(_) => {}
        }

        if self.policy == InvalidationPolicy::Strict {
            for secondary in &reference.secondary_ranges {
                match provider.range_content(secondary.id) {
                    None => return Some(PurgeReason::Unresolved),
                    Some(content) if content != secondary.expected_content => {
                        return Some(PurgeReason::Stale);
                    }
                    Some(_) => {}
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TextBuffer;
    use crate::decorations::{RangeEdit, RangeSpec, StyleTag};
    use crate::model::SourceConfig;
    use uuid::Uuid;

    fn setup(text: &str, span: TextRange) -> (TextBuffer, ReferenceRegistry) {
        let mut buffer = TextBuffer::from_text(text);
        let markup = Markup::new("m1");
        let ids = buffer
            .create_ranges(vec![RangeSpec::attached(
                span,
                StyleTag::AssetTable,
                markup.clone(),
            )])
            .unwrap();
        let mut registry = ReferenceRegistry::new();
        registry
            .register(SourceReference {
                markup,
                config: SourceConfig::table(Uuid::nil()),
                primary_range: ids[0],
                secondary_ranges: Vec::new(),
                expected_content: buffer.content(span),
            })
            .unwrap();
        (buffer, registry)
    }

    fn edit_and_run(
        buffer: &mut TextBuffer,
        registry: &mut ReferenceRegistry,
        edit: RangeEdit,
    ) -> InvalidationReport {
        let batch = buffer.apply_edits(&[edit]).unwrap();
        let regions = EditInvalidator::affected_regions(buffer, &batch);
        EditInvalidator::default().run(buffer, registry, &regions)
    }

    #[test]
    fn test_edit_inside_primary_purges() {
        let (mut buffer, mut registry) = setup("select * from \"table_1\"", TextRange::new(14, 23));
        let report = edit_and_run(&mut buffer, &mut registry, RangeEdit::insert(18, "x"));

        assert_eq!(report.purged.len(), 1);
        assert_eq!(report.purged[0].reason, PurgeReason::Stale);
        assert!(registry.is_empty());
        assert_eq!(buffer.range_count(), 0);
    }

    #[test]
    fn test_edit_outside_range_keeps_reference() {
        let (mut buffer, mut registry) = setup("select * from \"table_1\"", TextRange::new(14, 23));
        let report = edit_and_run(&mut buffer, &mut registry, RangeEdit::insert(0, "  "));

        assert!(report.purged.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_typing_at_edges_keeps_reference() {
        let (mut buffer, mut registry) = setup("\"table_1\"", TextRange::new(0, 9));
        edit_and_run(&mut buffer, &mut registry, RangeEdit::insert(9, " t"));
        edit_and_run(&mut buffer, &mut registry, RangeEdit::insert(0, "from "));

        assert_eq!(registry.len(), 1);
        assert_eq!(buffer.text(), "from \"table_1\" t");
    }

    #[test]
    fn test_deleting_whole_reference_purges() {
        let (mut buffer, mut registry) = setup("a \"table_1\" b", TextRange::new(2, 11));
        let report = edit_and_run(
            &mut buffer,
            &mut registry,
            RangeEdit::delete(TextRange::new(0, 13)),
        );
        assert_eq!(report.purged.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_multiline_insertion_widens_region() {
        let mut buffer = TextBuffer::from_text("x\n\"t\"");
        let batch = buffer
            .apply_edits(&[RangeEdit::insert(1, "\n\nabc")])
            .unwrap();
        let regions = EditInvalidator::affected_regions(&buffer, &batch);
        // Region covers the inserted text through the end of its last line.
        assert_eq!(regions, vec![TextRange::new(1, 6)]);

        let mut buffer = TextBuffer::from_text("ab\ncd");
        let batch = buffer
            .apply_edits(&[RangeEdit::insert(1, "1\n2")])
            .unwrap();
        let regions = EditInvalidator::affected_regions(&buffer, &batch);
        assert_eq!(regions, vec![TextRange::new(1, 5)]);
        assert_eq!(buffer.content(regions[0]), "1\n2b");
    }

    #[test]
    fn test_regions_account_for_earlier_changes_in_batch() {
        let mut buffer = TextBuffer::from_text("0123456789");
        let batch = buffer
            .apply_edits(&[
                RangeEdit::insert(2, "abc"),
                RangeEdit::new(TextRange::new(6, 8), "Z"),
            ])
            .unwrap();
        let regions = EditInvalidator::affected_regions(&buffer, &batch);
        assert_eq!(regions, vec![TextRange::new(2, 5), TextRange::new(9, 10)]);
        assert_eq!(buffer.content(regions[1]), "Z");
    }

    #[test]
    fn test_unresolved_primary_is_purged_lazily() {
        let (mut buffer, mut registry) = setup("\"table_1\"", TextRange::new(0, 9));
        let primary = registry.get(&Markup::new("m1")).unwrap().primary_range;
        buffer.remove_ranges(&[primary]);

        let report = EditInvalidator::default().run(&mut buffer, &mut registry, &[]);
        assert_eq!(
            report.purged,
            vec![Purge {
                markup: Markup::new("m1"),
                reason: PurgeReason::Unresolved,
            }]
        );
    }
}
