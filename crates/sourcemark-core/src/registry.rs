//! Registry of active references.
//!
//! References are keyed by markup and kept in registration order; a reverse index maps every
//! tracked range (primary and secondary) to the markup that owns it.

use crate::decorations::RangeId;
use crate::error::RegistryError;
use crate::model::{Markup, SourceReference};
use crate::provider::TrackedRangeProvider;
use std::collections::HashMap;

/// Logging target for registry events.
const LOG_TARGET: &str = "sourcemark::registry";

/// Active references of one document session.
#[derive(Debug, Clone, Default)]
pub struct ReferenceRegistry {
    references: HashMap<Markup, SourceReference>,
    order: Vec<Markup>,
    by_range: HashMap<RangeId, Markup>,
}

impl ReferenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reference.
    ///
    /// Fails if the markup is already registered or one of its ranges belongs to another
    /// reference; the registry is unchanged on failure.
    pub fn register(&mut self, reference: SourceReference) -> Result<(), RegistryError> {
        if self.references.contains_key(&reference.markup) {
            return Err(RegistryError::DuplicateMarkup(reference.markup));
        }
        for id in reference.range_ids() {
            if let Some(owner) = self.by_range.get(&id) {
                return Err(RegistryError::RangeAlreadyOwned {
                    range: id,
                    owner: owner.clone(),
                });
            }
        }

        for id in reference.range_ids() {
            self.by_range.insert(id, reference.markup.clone());
        }
        log::trace!(target: LOG_TARGET, "registered '{}'", reference.markup);
        self.order.push(reference.markup.clone());
        self.references.insert(reference.markup.clone(), reference);
        Ok(())
    }

    /// The reference owning a tracked range.
    pub fn lookup_by_range(&self, id: RangeId) -> Option<&SourceReference> {
        self.by_range
            .get(&id)
            .and_then(|markup| self.references.get(markup))
    }

    /// Look up a reference by markup.
    pub fn get(&self, markup: &Markup) -> Option<&SourceReference> {
        self.references.get(markup)
    }

    /// Whether `markup` is registered.
    pub fn contains(&self, markup: &Markup) -> bool {
        self.references.contains_key(markup)
    }

    /// Remove a reference and release all of its ranges through `provider`.
    pub fn remove<P>(&mut self, markup: &Markup, provider: &mut P) -> Option<SourceReference>
    where
        P: TrackedRangeProvider + ?Sized,
    {
        let reference = self.references.remove(markup)?;
        self.order.retain(|m| m != markup);

        let ids: Vec<RangeId> = reference.range_ids().collect();
        for id in &ids {
            self.by_range.remove(id);
        }
        provider.remove_ranges(&ids);

        log::trace!(target: LOG_TARGET, "removed '{}'", markup);
        Some(reference)
    }

    /// Remove every reference, releasing their ranges through `provider`.
    pub fn clear<P>(&mut self, provider: &mut P)
    where
        P: TrackedRangeProvider + ?Sized,
    {
        let ids: Vec<RangeId> = self.by_range.keys().copied().collect();
        provider.remove_ranges(&ids);
        self.references.clear();
        self.order.clear();
        self.by_range.clear();
    }

    /// Value snapshot of every reference, in registration order.
    pub fn list(&self) -> Vec<SourceReference> {
        self.iter().cloned().collect()
    }

    /// Iterate over references in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceReference> {
        self.order.iter().filter_map(|m| self.references.get(m))
    }

    /// Number of references.
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}
