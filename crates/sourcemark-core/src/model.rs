//! Source references and their configuration payloads.

use crate::decorations::{RangeId, StyleTag};
use crate::registry::ReferenceRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque id of one reference, shared by its rendered and canonical representations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Markup(String);

impl Markup {
    /// Wrap an existing markup id.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The canonical token for this markup, quoted according to `kind`.
    ///
    /// `"{{m1}}"` for tables, `'{{m1}}'` for time series.
    pub fn token(&self, kind: SourceKind) -> String {
        let quote = kind.token_quote();
        format!("{quote}{{{{{}}}}}{quote}", self.0)
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Markup {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Generates session-unique markup ids of the form `<prefix><n>`.
#[derive(Debug, Clone)]
pub struct MarkupGenerator {
    prefix: String,
    counter: u64,
}

impl MarkupGenerator {
    /// Create a generator using `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
        }
    }

    /// Next id not currently registered in `registry`.
    pub fn next_unused(&mut self, registry: &ReferenceRegistry) -> Markup {
        loop {
            self.counter += 1;
            let candidate = Markup(format!("{}{}", self.prefix, self.counter));
            if !registry.contains(&candidate) {
                return candidate;
            }
        }
    }
}

impl Default for MarkupGenerator {
    fn default() -> Self {
        Self::new("m")
    }
}

/// Wire-level source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// An asset table.
    AssetTable,
    /// Time-series data of an asset.
    Timeseries,
}

/// Whether a time-series reference selects one attribute or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeseriesMode {
    /// A single attribute (`target`).
    Single,
    /// Every attribute of the asset.
    #[default]
    Multiple,
}

/// Configuration of a table reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    /// Referenced table.
    pub table_id: Uuid,
}

/// Configuration of a time-series reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesConfig {
    /// Referenced asset.
    pub asset_id: Uuid,
    /// Selected attribute, for single-series references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Selection mode.
    #[serde(default)]
    pub mode: TimeseriesMode,
}

/// Query-time configuration of a reference, keyed by source type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceConfig {
    /// `asset_table`.
    AssetTable(TableConfig),
    /// `timeseries`.
    Timeseries(TimeseriesConfig),
}

impl SourceConfig {
    /// A table reference.
    pub fn table(table_id: Uuid) -> Self {
        Self::AssetTable(TableConfig { table_id })
    }

    /// A time-series reference; `Single` when a target attribute is given, `Multiple` otherwise.
    pub fn timeseries(asset_id: Uuid, target: Option<String>) -> Self {
        let mode = if target.is_some() {
            TimeseriesMode::Single
        } else {
            TimeseriesMode::Multiple
        };
        Self::Timeseries(TimeseriesConfig {
            asset_id,
            target,
            mode,
        })
    }

    /// Configuration implied by a bare source id when a document omits `sourceConfig`.
    pub fn implied(source_type: SourceType, source_id: Uuid) -> Self {
        match source_type {
            SourceType::AssetTable => Self::table(source_id),
            SourceType::Timeseries => Self::timeseries(source_id, None),
        }
    }

    /// Wire-level type tag.
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::AssetTable(_) => SourceType::AssetTable,
            Self::Timeseries(_) => SourceType::Timeseries,
        }
    }

    /// Id of the referenced backend entity.
    pub fn source_id(&self) -> Uuid {
        match self {
            Self::AssetTable(config) => config.table_id,
            Self::Timeseries(config) => config.asset_id,
        }
    }

    /// Rendering/tokenization kind.
    ///
    /// A time series counts as single only when its mode says so and a target is present.
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::AssetTable(_) => SourceKind::Table,
            Self::Timeseries(TimeseriesConfig {
                target: Some(_),
                mode: TimeseriesMode::Single,
                ..
            }) => SourceKind::TimeseriesSingle,
            Self::Timeseries(_) => SourceKind::TimeseriesMultiple,
        }
    }
}

/// The three ways a reference renders and tokenizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// `"table"`, token `"{{markup}}"`.
    Table,
    /// `"asset"."attribute"`, token `'{{markup}}'`.
    TimeseriesSingle,
    /// `"asset"`, token `'{{markup}}'`.
    TimeseriesMultiple,
}

impl SourceKind {
    /// Quote character wrapping the canonical token.
    pub fn token_quote(self) -> char {
        match self {
            SourceKind::Table => '"',
            SourceKind::TimeseriesSingle | SourceKind::TimeseriesMultiple => '\'',
        }
    }

    /// Style of the primary range.
    pub fn primary_style(self) -> StyleTag {
        match self {
            SourceKind::Table => StyleTag::AssetTable,
            SourceKind::TimeseriesSingle => StyleTag::TimeseriesContainer,
            SourceKind::TimeseriesMultiple => StyleTag::TimeseriesTag,
        }
    }
}

/// A cosmetic sub-span of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryRange {
    /// Tracked range id.
    pub id: RangeId,
    /// Paint style.
    pub style: StyleTag,
    /// Text captured when the range was created.
    pub expected_content: String,
}

/// A live reference from the text to a backend data entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    /// Session-unique id.
    pub markup: Markup,
    /// Query-time configuration.
    pub config: SourceConfig,
    /// The range whose live content decides validity.
    pub primary_range: RangeId,
    /// Ordered cosmetic sub-spans.
    pub secondary_ranges: Vec<SecondaryRange>,
    /// Primary range text at creation or last validation.
    pub expected_content: String,
}

impl SourceReference {
    /// Rendering/tokenization kind.
    pub fn kind(&self) -> SourceKind {
        self.config.kind()
    }

    /// Primary followed by secondary range ids.
    pub fn range_ids(&self) -> impl Iterator<Item = RangeId> + '_ {
        std::iter::once(self.primary_range).chain(self.secondary_ranges.iter().map(|s| s.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_quoted_per_kind() {
        let markup = Markup::new("m1");
        assert_eq!(markup.token(SourceKind::Table), "\"{{m1}}\"");
        assert_eq!(markup.token(SourceKind::TimeseriesSingle), "'{{m1}}'");
        assert_eq!(markup.token(SourceKind::TimeseriesMultiple), "'{{m1}}'");
    }

    #[test]
    fn test_timeseries_mode_follows_target() {
        let asset = Uuid::nil();
        let single = SourceConfig::timeseries(asset, Some("pressure".to_string()));
        let multiple = SourceConfig::timeseries(asset, None);

        assert_eq!(single.kind(), SourceKind::TimeseriesSingle);
        assert_eq!(multiple.kind(), SourceKind::TimeseriesMultiple);
        assert_eq!(single.source_type(), SourceType::Timeseries);
        assert_eq!(single.source_id(), asset);
    }

    #[test]
    fn test_single_mode_without_target_renders_as_multiple() {
        let config = SourceConfig::Timeseries(TimeseriesConfig {
            asset_id: Uuid::nil(),
            target: None,
            mode: TimeseriesMode::Single,
        });
        assert_eq!(config.kind(), SourceKind::TimeseriesMultiple);
    }

    #[test]
    fn test_generator_skips_registered_markups() {
        let registry = ReferenceRegistry::new();
        let mut generator = MarkupGenerator::default();
        assert_eq!(generator.next_unused(&registry), Markup::new("m1"));
        assert_eq!(generator.next_unused(&registry), Markup::new("m2"));
    }
}
