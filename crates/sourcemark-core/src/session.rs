//! The editing session.
//!
//! [`QuerySession`] ties the pieces together for one document: the live surface, the registry
//! of references, debounced invalidation, conversions and the query parameters. Hosts drive
//! it with edits and clock ticks; every mutation of the live text goes through the session so
//! invalidation sees it.

use crate::config::SessionConfig;
use crate::convert::{MarkupConverter, MaterializeReport, commit};
use crate::debounce::Debouncer;
use crate::decorations::{RangeEdit, TextRange};
use crate::delta::ChangeBatch;
use crate::document::{ExecuteRequest, Parameter, QueryDocument};
use crate::error::{RegistryError, SessionError};
use crate::invalidate::{EditInvalidator, InvalidationPolicy, InvalidationReport};
use crate::model::{Markup, MarkupGenerator, SecondaryRange, SourceConfig, SourceReference};
use crate::provider::{InMemoryScratch, ScratchFactory, TrackedRangeProvider};
use crate::registry::ReferenceRegistry;
use crate::render::{Catalog, Rendering, StaticCatalog, render};
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// Logging target for session events.
const LOG_TARGET: &str = "sourcemark::session";

/// State the debounced invalidation pass operates on.
struct LiveDocument<P> {
    provider: P,
    registry: ReferenceRegistry,
    last_report: Option<InvalidationReport>,
}

fn invalidation_handler<P>(
    invalidator: EditInvalidator,
) -> impl FnMut(&mut LiveDocument<P>, Vec<TextRange>) + 'static
where
    P: TrackedRangeProvider + 'static,
{
    move |live: &mut LiveDocument<P>, regions: Vec<TextRange>| {
        let report = invalidator.run(&mut live.provider, &mut live.registry, &regions);
        if !report.purged.is_empty() {
            log::debug!(
                target: LOG_TARGET,
                "invalidation purged {} of {} checked references",
                report.purged.len(),
                report.checked
            );
        }
        live.last_report = Some(report);
    }
}

/// One document being edited, with its references and parameters.
pub struct QuerySession<P, S = InMemoryScratch> {
    live: LiveDocument<P>,
    debouncer: Debouncer<TextRange, LiveDocument<P>>,
    policy: InvalidationPolicy,
    converter: MarkupConverter<S>,
    catalog: Box<dyn Catalog>,
    markups: MarkupGenerator,
    parameters: Vec<Parameter>,
}

impl<P> QuerySession<P, InMemoryScratch>
where
    P: TrackedRangeProvider + 'static,
{
    /// Create a session over `provider` using in-memory scratch buffers.
    pub fn new(provider: P, config: &SessionConfig) -> Self {
        Self::with_scratch(provider, InMemoryScratch, config)
    }
}

impl<P, S> QuerySession<P, S>
where
    P: TrackedRangeProvider + 'static,
    S: ScratchFactory,
{
    /// Create a session drawing conversion scratch surfaces from `scratch`.
    pub fn with_scratch(provider: P, scratch: S, config: &SessionConfig) -> Self {
        let policy = config.invalidation;
        Self {
            live: LiveDocument {
                provider,
                registry: ReferenceRegistry::new(),
                last_report: None,
            },
            debouncer: Debouncer::new(
                config.debounce(),
                invalidation_handler(EditInvalidator::new(policy)),
            ),
            policy,
            converter: MarkupConverter::new(scratch, config.conversion_timeout()),
            catalog: Box::new(StaticCatalog::new()),
            markups: MarkupGenerator::new(config.markup_prefix.clone()),
            parameters: Vec::new(),
        }
    }

    /// Replace the catalog used to render names.
    pub fn set_catalog(&mut self, catalog: impl Catalog + 'static) {
        self.catalog = Box::new(catalog);
    }

    /// The live surface.
    pub fn provider(&self) -> &P {
        &self.live.provider
    }

    /// The live text.
    pub fn text(&self) -> String {
        self.live.provider.text()
    }

    /// Value snapshot of the active references, in creation order.
    pub fn references(&self) -> Vec<SourceReference> {
        self.live.registry.list()
    }

    /// Look up a reference by markup.
    pub fn reference(&self, markup: &Markup) -> Option<&SourceReference> {
        self.live.registry.get(markup)
    }

    /// The reference whose ranges touch `offset`, if any.
    pub fn reference_at(&self, offset: usize) -> Option<&SourceReference> {
        self.live
            .provider
            .ranges_in(TextRange::empty(offset))
            .into_iter()
            .filter(|(_, style)| style.is_reference_bearing())
            .find_map(|(id, _)| self.live.registry.lookup_by_range(id))
    }

    /// Replace `selection` with a rendered table reference.
    pub fn insert_table(
        &mut self,
        selection: TextRange,
        table_id: Uuid,
    ) -> Result<Markup, SessionError> {
        self.insert_reference(selection, SourceConfig::table(table_id))
    }

    /// Replace `selection` with a rendered time-series reference.
    ///
    /// With a `target` the reference selects that one attribute; without, all of them.
    pub fn insert_timeseries(
        &mut self,
        selection: TextRange,
        asset_id: Uuid,
        target: Option<String>,
    ) -> Result<Markup, SessionError> {
        self.insert_reference(selection, SourceConfig::timeseries(asset_id, target))
    }

    /// Replace `selection` with a rendered reference for `config`.
    pub fn insert_reference(
        &mut self,
        selection: TextRange,
        config: SourceConfig,
    ) -> Result<Markup, SessionError> {
        let rendering = render(&config, self.catalog.as_ref());
        self.apply_edits(&[RangeEdit::new(selection, rendering.text.as_str())])?;

        let markup = self.markups.next_unused(&self.live.registry);
        self.place(markup.clone(), config, &rendering, selection.start)?;
        log::debug!(target: LOG_TARGET, "inserted '{}' at {}", markup, selection.start);
        Ok(markup)
    }

    /// Change a reference's configuration, re-rendering it in place.
    ///
    /// Its ranges and expected content are replaced wholesale; the markup is kept.
    pub fn update_reference(
        &mut self,
        markup: &Markup,
        config: SourceConfig,
    ) -> Result<(), SessionError> {
        let reference = self
            .live
            .registry
            .get(markup)
            .ok_or_else(|| RegistryError::UnknownMarkup(markup.clone()))?;
        let span = self
            .live
            .provider
            .range(reference.primary_range)
            .ok_or_else(|| SessionError::UnresolvedRange(markup.clone()))?;

        let rendering = render(&config, self.catalog.as_ref());
        self.apply_edits(&[RangeEdit::new(span, rendering.text.as_str())])?;
        self.live
            .registry
            .remove(markup, &mut self.live.provider);
        self.place(markup.clone(), config, &rendering, span.start)?;

        log::debug!(target: LOG_TARGET, "updated '{}'", markup);
        Ok(())
    }

    /// Unregister a reference and release its ranges. The text is left as it is.
    pub fn remove_reference(&mut self, markup: &Markup) -> Result<SourceReference, SessionError> {
        self.live
            .registry
            .remove(markup, &mut self.live.provider)
            .ok_or_else(|| RegistryError::UnknownMarkup(markup.clone()).into())
    }

    // Create ranges for a rendering already present at `offset` and register them.
    fn place(
        &mut self,
        markup: Markup,
        config: SourceConfig,
        rendering: &Rendering,
        offset: usize,
    ) -> Result<(), SessionError> {
        let specs = rendering.range_specs(offset, &markup);
        let styles: Vec<_> = specs.iter().map(|spec| spec.style).collect();
        let ids = self.live.provider.create_ranges(specs)?;

        let provider = &self.live.provider;
        let mut ranges = ids.iter().zip(styles).map(|(&id, style)| SecondaryRange {
            id,
            style,
            expected_content: provider.range_content(id).unwrap_or_default(),
        });
        let Some(primary) = ranges.next() else {
            return Err(SessionError::UnresolvedRange(markup));
        };
        let reference = SourceReference {
            markup,
            config,
            primary_range: primary.id,
            secondary_ranges: ranges.collect(),
            expected_content: primary.expected_content,
        };

        if let Err(err) = self.live.registry.register(reference) {
            self.live.provider.remove_ranges(&ids);
            return Err(err.into());
        }
        Ok(())
    }

    /// Apply edits to the live text and queue invalidation of the regions they touch.
    pub fn apply_edits(&mut self, edits: &[RangeEdit]) -> Result<ChangeBatch, SessionError> {
        self.apply_edits_at(edits, Instant::now())
    }

    /// [`apply_edits`](Self::apply_edits) with an explicit clock reading.
    pub fn apply_edits_at(
        &mut self,
        edits: &[RangeEdit],
        now: Instant,
    ) -> Result<ChangeBatch, SessionError> {
        let batch = self.live.provider.apply_edits(edits)?;
        if batch.is_empty() {
            return Ok(batch);
        }

        for region in self.debouncer.pending_mut() {
            *region = batch.map_range(*region);
        }
        let regions = EditInvalidator::affected_regions(&self.live.provider, &batch);
        self.debouncer.push(regions, now);
        Ok(batch)
    }

    /// Run the pending invalidation pass if the quiescence window has passed at `now`.
    pub fn tick(&mut self, now: Instant) -> Option<InvalidationReport> {
        if self.debouncer.poll(now, &mut self.live) {
            self.live.last_report.take()
        } else {
            None
        }
    }

    /// Run the pending invalidation pass immediately.
    pub fn flush_invalidation(&mut self) -> Option<InvalidationReport> {
        if self.debouncer.flush(&mut self.live) {
            self.live.last_report.take()
        } else {
            None
        }
    }

    /// Whether edits are waiting for an invalidation pass.
    pub fn has_pending_invalidation(&self) -> bool {
        self.debouncer.has_pending()
    }

    /// When the pending invalidation pass becomes due.
    pub fn invalidation_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Active invalidation policy.
    pub fn invalidation_policy(&self) -> InvalidationPolicy {
        self.policy
    }

    /// Switch the invalidation policy. Edits already queued are judged by the new policy.
    pub fn set_invalidation_policy(&mut self, policy: InvalidationPolicy) {
        self.policy = policy;
        self.debouncer
            .set_handler(invalidation_handler(EditInvalidator::new(policy)));
    }

    /// Canonicalize the live document into an exchange document.
    ///
    /// Pending invalidation runs first, so stale references never reach the output.
    pub fn export(&mut self) -> Result<QueryDocument, SessionError> {
        self.flush_invalidation();
        let snapshot = self.live.registry.list();
        let form = self
            .converter
            .canonicalize(&self.live.provider, &snapshot)?;
        if !form.skipped.is_empty() {
            log::debug!(
                target: LOG_TARGET,
                "export left out {} references",
                form.skipped.len()
            );
        }
        Ok(form.into_document(self.parameters.clone()))
    }

    /// Replace the live document with the rendered form of `document`.
    ///
    /// Existing references are dropped and the parameters replaced. On failure nothing
    /// changes.
    pub fn load(&mut self, document: &QueryDocument) -> Result<MaterializeReport, SessionError> {
        let plan = self
            .converter
            .plan_materialize(document, self.catalog.as_ref())?;
        let report = commit(plan, &mut self.live.provider, &mut self.live.registry)?;

        self.debouncer.cancel();
        self.parameters = document.parameters.clone();
        log::debug!(
            target: LOG_TARGET,
            "loaded {} references ({} skipped)",
            report.loaded.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Export the document together with arguments as an execution request.
    pub fn execute_request(
        &mut self,
        arguments: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<ExecuteRequest, SessionError> {
        Ok(ExecuteRequest::new(self.export()?, arguments))
    }

    /// Query parameters.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Add a parameter.
    pub fn add_parameter(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    /// Replace the parameter with the same id. Returns `false` if there is none.
    pub fn update_parameter(&mut self, parameter: Parameter) -> bool {
        match self.parameters.iter_mut().find(|p| p.id == parameter.id) {
            Some(slot) => {
                *slot = parameter;
                true
            }
            None => false,
        }
    }

    /// Remove a parameter by id.
    pub fn remove_parameter(&mut self, id: &str) -> Option<Parameter> {
        let index = self.parameters.iter().position(|p| p.id == id)?;
        Some(self.parameters.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TextBuffer;
    use crate::document::DataType;
    use crate::invalidate::PurgeReason;

    fn session(text: &str) -> QuerySession<TextBuffer> {
        let mut session = QuerySession::new(TextBuffer::from_text(text), &SessionConfig::default());
        session.set_catalog(
            StaticCatalog::new()
                .with_table(Uuid::nil(), "table_1")
                .with_table(Uuid::from_u128(1), "orders")
                .with_asset(Uuid::nil(), "asset_1"),
        );
        session
    }

    #[test]
    fn test_update_reference_rerenders_in_place() {
        let mut session = session("select * from ");
        let markup = session
            .insert_table(TextRange::empty(14), Uuid::nil())
            .unwrap();

        session
            .update_reference(&markup, SourceConfig::table(Uuid::from_u128(1)))
            .unwrap();

        assert_eq!(session.text(), "select * from \"orders\"");
        let reference = session.reference(&markup).unwrap();
        assert_eq!(reference.expected_content, "\"orders\"");
        assert_eq!(session.flush_invalidation().unwrap().purged, vec![]);
        assert_eq!(session.references().len(), 1);
    }

    #[test]
    fn test_update_unknown_reference_fails() {
        let mut session = session("");
        let err = session
            .update_reference(&Markup::new("nope"), SourceConfig::table(Uuid::nil()))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Registry(RegistryError::UnknownMarkup(_))
        ));
    }

    #[test]
    fn test_reference_at_offset() {
        let mut session = session("x ");
        let markup = session
            .insert_timeseries(TextRange::empty(2), Uuid::nil(), Some("pressure".into()))
            .unwrap();

        assert_eq!(session.reference_at(12).map(|r| &r.markup), Some(&markup));
        assert!(session.reference_at(0).is_none());
    }

    #[test]
    fn test_remove_reference_keeps_text() {
        let mut session = session("");
        let markup = session
            .insert_table(TextRange::empty(0), Uuid::nil())
            .unwrap();
        let removed = session.remove_reference(&markup).unwrap();

        assert_eq!(removed.markup, markup);
        assert_eq!(session.text(), "\"table_1\"");
        assert!(session.references().is_empty());
        assert!(session.remove_reference(&markup).is_err());
    }

    #[test]
    fn test_strict_policy_checks_sub_spans() {
        let mut session = session("");
        session
            .insert_timeseries(TextRange::empty(0), Uuid::nil(), Some("pressure".into()))
            .unwrap();
        session.flush_invalidation();

        // Rewrites the asset name and dot with identical text: the container is unchanged
        // but the sub-spans collapse.
        session
            .apply_edits(&[RangeEdit::new(TextRange::new(0, 10), "\"asset_1\".")])
            .unwrap();
        session.set_invalidation_policy(InvalidationPolicy::Strict);
        let report = session.flush_invalidation().unwrap();

        assert_eq!(report.purged.len(), 1);
        assert_eq!(report.purged[0].reason, PurgeReason::Stale);
    }

    #[test]
    fn test_primary_only_policy_ignores_sub_spans() {
        let mut session = session("");
        session
            .insert_timeseries(TextRange::empty(0), Uuid::nil(), Some("pressure".into()))
            .unwrap();
        session
            .apply_edits(&[RangeEdit::new(TextRange::new(0, 10), "\"asset_1\".")])
            .unwrap();

        let report = session.flush_invalidation().unwrap();
        assert!(report.purged.is_empty());
        assert_eq!(session.references().len(), 1);
    }

    #[test]
    fn test_parameter_crud() {
        let mut session = session("");
        let mut limit = Parameter::new("limit", DataType::Int);
        session.add_parameter(limit.clone());

        limit.default_value = Some(Value::from(10));
        assert!(session.update_parameter(limit.clone()));
        assert_eq!(session.parameters()[0].default_value, Some(Value::from(10)));

        assert!(!session.update_parameter(Parameter::new("other", DataType::Text)));
        assert_eq!(session.remove_parameter(&limit.id).map(|p| p.name), Some("limit".into()));
        assert!(session.parameters().is_empty());
    }
}
