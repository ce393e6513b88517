//! Conversion between rendered and canonical text.
//!
//! Both directions run in a private scratch surface obtained from a [`ScratchFactory`]. Each
//! reference's span is tracked by a bookkeeping range, so replacements can be applied one by
//! one and later spans land at their shifted offsets without any offset arithmetic here.
//!
//! Materialization is split in two steps: [`MarkupConverter::plan_materialize`] computes the
//! whole result in scratch, and [`commit`] installs it on the live surface, restoring the
//! previous state if installation fails.

use crate::decorations::{RangeEdit, RangeId, RangeSpec, StyleTag, TextRange};
use crate::document::{Parameter, QueryDocument, SourceDto, WireRange, token_census};
use crate::error::ConvertError;
use crate::model::{Markup, SecondaryRange, SourceConfig, SourceReference};
use crate::provider::{InMemoryScratch, ScratchFactory, TrackedRangeProvider};
use crate::registry::ReferenceRegistry;
use crate::render::{Catalog, render};
use std::collections::HashSet;
use std::time::Duration;

/// Logging target for conversions.
const LOG_TARGET: &str = "sourcemark::convert";

/// Default readiness deadline for scratch surfaces.
pub const DEFAULT_CONVERSION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Result of canonicalizing a live document.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalForm {
    /// Canonical text.
    pub query: String,
    /// One source per emitted token, in reference order.
    pub sources: Vec<SourceDto>,
    /// References left out because their primary range no longer resolves or collides with
    /// an earlier reference.
    pub skipped: Vec<Markup>,
}

impl CanonicalForm {
    /// Attach parameters to form an exchange document.
    pub fn into_document(self, parameters: Vec<Parameter>) -> QueryDocument {
        QueryDocument {
            query: self.query,
            sources: self.sources,
            parameters,
        }
    }
}

/// Why a source was left out of a materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `markupRange` does not exist in the query.
    OutOfBounds,
    /// `markupRange` covers no text.
    EmptyRange,
    /// No `markupRange` and no token for the markup in the query.
    MissingToken,
    /// The span overlaps the span of an earlier source.
    Overlapping,
    /// The span stopped resolving during conversion.
    Unresolved,
}

/// A source left out of a materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
    /// The source's markup.
    pub markup: Markup,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// A range to create on the live surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRange {
    /// Paint style.
    pub style: StyleTag,
    /// Position in the planned text.
    pub range: TextRange,
    /// Text covered by the range.
    pub content: String,
}

/// A reference to create on the live surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReference {
    /// Markup carried over from the document.
    pub markup: Markup,
    /// Query-time configuration.
    pub config: SourceConfig,
    /// Primary range; its content becomes the expected content.
    pub primary: PlannedRange,
    /// Cosmetic sub-spans.
    pub secondaries: Vec<PlannedRange>,
}

/// The complete outcome of a materialization, computed before the live surface is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializePlan {
    /// Rendered text.
    pub text: String,
    /// References in document order.
    pub references: Vec<PlannedReference>,
    /// Sources that could not be placed.
    pub skipped: Vec<SkippedSource>,
}

/// Outcome of a committed materialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Markups of the references now live, in document order.
    pub loaded: Vec<Markup>,
    /// Sources that were skipped.
    pub skipped: Vec<SkippedSource>,
}

/// Converts between rendered and canonical text using scratch surfaces.
#[derive(Debug, Clone)]
pub struct MarkupConverter<S = InMemoryScratch> {
    scratch: S,
    timeout: Duration,
}

impl Default for MarkupConverter<InMemoryScratch> {
    fn default() -> Self {
        Self::new(InMemoryScratch, DEFAULT_CONVERSION_TIMEOUT)
    }
}

impl<S: ScratchFactory> MarkupConverter<S> {
    /// Create a converter drawing scratch surfaces from `scratch`.
    pub fn new(scratch: S, timeout: Duration) -> Self {
        Self { scratch, timeout }
    }

    /// Readiness deadline for scratch surfaces.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the readiness deadline.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Replace every reference's rendered span with its canonical token.
    ///
    /// `references` is a snapshot taken by the caller; `live` is only read. References whose
    /// primary range no longer resolves are skipped.
    pub fn canonicalize<P>(
        &mut self,
        live: &P,
        references: &[SourceReference],
    ) -> Result<CanonicalForm, ConvertError>
    where
        P: TrackedRangeProvider + ?Sized,
    {
        let mut scratch = self.scratch.open(&live.text(), self.timeout)?;

        let mut placed: Vec<(&SourceReference, TextRange)> = Vec::with_capacity(references.len());
        let mut skipped = Vec::new();
        for reference in references {
            let Some(range) = live.range(reference.primary_range) else {
                log::debug!(target: LOG_TARGET, "skipping unresolved '{}'", reference.markup);
                skipped.push(reference.markup.clone());
                continue;
            };
            if placed.iter().any(|(_, other)| other.overlaps(&range)) {
                log::warn!(target: LOG_TARGET, "skipping overlapping '{}'", reference.markup);
                skipped.push(reference.markup.clone());
                continue;
            }
            placed.push((reference, range));
        }

        let ids = scratch.create_ranges(
            placed
                .iter()
                .map(|(_, range)| RangeSpec::bookkeeping(*range))
                .collect(),
        )?;

        for ((reference, _), id) in placed.iter().zip(&ids) {
            let span = tracked(&scratch, *id, &reference.markup)?;
            let token = reference.markup.token(reference.kind());
            scratch.apply_edits(&[RangeEdit::new(span, token)])?;
        }

        let mut sources = Vec::with_capacity(placed.len());
        for ((reference, _), id) in placed.iter().zip(&ids) {
            let span = tracked(&scratch, *id, &reference.markup)?;
            sources.push(SourceDto {
                markup: reference.markup.clone(),
                markup_range: Some(WireRange::from_text_range(&scratch, span)),
                config: reference.config.clone(),
            });
        }

        log::debug!(
            target: LOG_TARGET,
            "canonicalized {} references ({} skipped)",
            sources.len(),
            skipped.len()
        );
        Ok(CanonicalForm {
            query: scratch.text(),
            sources,
            skipped,
        })
    }

    /// Compute the rendered text and references for `document` without touching any live
    /// surface.
    ///
    /// Sources whose span cannot be placed are reported in [`MaterializePlan::skipped`];
    /// a markup listed twice fails the whole call.
    pub fn plan_materialize(
        &mut self,
        document: &QueryDocument,
        catalog: &dyn Catalog,
    ) -> Result<MaterializePlan, ConvertError> {
        let mut seen = HashSet::with_capacity(document.sources.len());
        for source in &document.sources {
            if !seen.insert(&source.markup) {
                return Err(ConvertError::DuplicateMarkup(source.markup.clone()));
            }
        }

        let mut scratch = self.scratch.open(&document.query, self.timeout)?;
        let mut skipped = Vec::new();

        let mut placed: Vec<(&SourceDto, TextRange)> = Vec::with_capacity(document.sources.len());
        for source in &document.sources {
            let span = match locate(&scratch, &document.query, source) {
                Ok(span) => span,
                Err(reason) => {
                    skip(&mut skipped, &source.markup, reason);
                    continue;
                }
            };
            if placed.iter().any(|(_, other)| other.overlaps(&span)) {
                skip(&mut skipped, &source.markup, SkipReason::Overlapping);
                continue;
            }
            placed.push((source, span));
        }

        let bookkeeping = scratch.create_ranges(
            placed
                .iter()
                .map(|(_, span)| RangeSpec::bookkeeping(*span))
                .collect(),
        )?;

        let mut rendered: Vec<(&SourceDto, Vec<(RangeId, StyleTag)>)> = Vec::new();
        for ((source, _), id) in placed.iter().zip(&bookkeeping) {
            let Some(span) = scratch.range(*id) else {
                skip(&mut skipped, &source.markup, SkipReason::Unresolved);
                continue;
            };

            let rendering = render(&source.config, catalog);
            scratch.apply_edits(&[RangeEdit::new(span, rendering.text.as_str())])?;

            let specs = rendering.range_specs(span.start, &source.markup);
            let styles: Vec<StyleTag> = specs.iter().map(|spec| spec.style).collect();
            let ids = scratch.create_ranges(specs)?;
            rendered.push((source, ids.into_iter().zip(styles).collect()));
        }
        scratch.remove_ranges(&bookkeeping);

        let mut references = Vec::with_capacity(rendered.len());
        for (source, ranges) in rendered {
            let mut planned = Vec::with_capacity(ranges.len());
            for (id, style) in ranges {
                let range = tracked(&scratch, id, &source.markup)?;
                planned.push(PlannedRange {
                    style,
                    range,
                    content: scratch.content(range),
                });
            }
            let mut planned = planned.into_iter();
            let Some(primary) = planned.next() else {
                continue;
            };
            references.push(PlannedReference {
                markup: source.markup.clone(),
                config: source.config.clone(),
                primary,
                secondaries: planned.collect(),
            });
        }

        log::debug!(
            target: LOG_TARGET,
            "planned {} references ({} skipped)",
            references.len(),
            skipped.len()
        );
        Ok(MaterializePlan {
            text: scratch.text(),
            references,
            skipped,
        })
    }

    /// Plan `document` and install it on `live`, replacing its text and references.
    ///
    /// All or nothing: on failure the live surface and registry are left as they were.
    pub fn materialize<P>(
        &mut self,
        document: &QueryDocument,
        catalog: &dyn Catalog,
        live: &mut P,
        registry: &mut ReferenceRegistry,
    ) -> Result<MaterializeReport, ConvertError>
    where
        P: TrackedRangeProvider + ?Sized,
    {
        let plan = self.plan_materialize(document, catalog)?;
        commit(plan, live, registry)
    }
}

/// Install a plan on `live`, restoring the previous text and references if anything fails.
pub fn commit<P>(
    plan: MaterializePlan,
    live: &mut P,
    registry: &mut ReferenceRegistry,
) -> Result<MaterializeReport, ConvertError>
where
    P: TrackedRangeProvider + ?Sized,
{
    let previous = capture(live, registry);

    match install(&plan.text, &plan.references, live, registry) {
        Ok(()) => Ok(MaterializeReport {
            loaded: plan.references.into_iter().map(|r| r.markup).collect(),
            skipped: plan.skipped,
        }),
        Err(err) => {
            log::warn!(target: LOG_TARGET, "materialize failed, restoring: {}", err);
            if let Err(restore) = install(&previous.text, &previous.references, live, registry) {
                log::warn!(target: LOG_TARGET, "restore incomplete: {}", restore);
            }
            Err(err)
        }
    }
}

/// Text and references of a live surface, in installable form.
struct LiveState {
    text: String,
    references: Vec<PlannedReference>,
}

fn capture<P>(live: &P, registry: &ReferenceRegistry) -> LiveState
where
    P: TrackedRangeProvider + ?Sized,
{
    let planned = |id: RangeId, style: StyleTag, content: &str| {
        live.range(id).map(|range| PlannedRange {
            style,
            range,
            content: content.to_string(),
        })
    };

    let references = registry
        .iter()
        .filter_map(|reference| {
            let primary = planned(
                reference.primary_range,
                reference.kind().primary_style(),
                &reference.expected_content,
            )?;
            let secondaries = reference
                .secondary_ranges
                .iter()
                .filter_map(|s| planned(s.id, s.style, &s.expected_content))
                .collect();
            Some(PlannedReference {
                markup: reference.markup.clone(),
                config: reference.config.clone(),
                primary,
                secondaries,
            })
        })
        .collect();

    LiveState {
        text: live.text(),
        references,
    }
}

fn install<P>(
    text: &str,
    references: &[PlannedReference],
    live: &mut P,
    registry: &mut ReferenceRegistry,
) -> Result<(), ConvertError>
where
    P: TrackedRangeProvider + ?Sized,
{
    registry.clear(live);
    live.set_text(text);

    for planned in references {
        let specs = std::iter::once(&planned.primary)
            .chain(&planned.secondaries)
            .map(|r| RangeSpec::attached(r.range, r.style, planned.markup.clone()))
            .collect();
        let ids = live.create_ranges(specs)?;
        let Some((&primary_range, secondary_ids)) = ids.split_first() else {
            continue;
        };

        let reference = SourceReference {
            markup: planned.markup.clone(),
            config: planned.config.clone(),
            primary_range,
            secondary_ranges: secondary_ids
                .iter()
                .zip(&planned.secondaries)
                .map(|(&id, r)| SecondaryRange {
                    id,
                    style: r.style,
                    expected_content: r.content.clone(),
                })
                .collect(),
            expected_content: planned.primary.content.clone(),
        };
        if let Err(err) = registry.register(reference) {
            live.remove_ranges(&ids);
            return Err(err.into());
        }
    }
    Ok(())
}

/// Where `source`'s token sits in the scratch copy of `query`.
fn locate<P>(scratch: &P, query: &str, source: &SourceDto) -> Result<TextRange, SkipReason>
where
    P: TrackedRangeProvider + ?Sized,
{
    if let Some(wire) = source.markup_range {
        let range = wire.to_text_range(scratch).ok_or(SkipReason::OutOfBounds)?;
        if range.is_empty() {
            return Err(SkipReason::EmptyRange);
        }
        return Ok(range);
    }

    let quote = source.config.kind().token_quote();
    let census = token_census(query);

    if let Some(quoted) = census
        .iter()
        .find(|o| o.markup == source.markup && o.quote == Some(quote))
    {
        return Ok(quoted.range);
    }
    census
        .iter()
        .find(|o| o.markup == source.markup)
        .map(|o| match o.quote {
            // Keep the foreign quotes in the text; replace only `{{markup}}`.
            Some(_) => TextRange::new(o.range.start + 1, o.range.end - 1),
            None => o.range,
        })
        .ok_or(SkipReason::MissingToken)
}

fn tracked<P>(provider: &P, id: RangeId, markup: &Markup) -> Result<TextRange, ConvertError>
where
    P: TrackedRangeProvider + ?Sized,
{
    provider
        .range(id)
        .ok_or_else(|| ConvertError::LostRange(markup.clone()))
}

fn skip(skipped: &mut Vec<SkippedSource>, markup: &Markup, reason: SkipReason) {
    log::warn!(target: LOG_TARGET, "skipping source '{}': {:?}", markup, reason);
    skipped.push(SkippedSource {
        markup: markup.clone(),
        reason,
    });
}
