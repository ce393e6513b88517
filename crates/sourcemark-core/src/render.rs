//! Rendered (human-readable) form of references.
//!
//! A reference renders as quoted SQL identifiers built from catalog names, never from its
//! markup. Sub-span boundaries are computed from the character lengths of the rendered
//! substrings, escapes included.

use crate::decorations::{RangeSpec, StyleTag, TextRange};
use crate::model::{Markup, SourceConfig, SourceKind, TimeseriesConfig};
use std::collections::HashMap;
use uuid::Uuid;

/// Resolves display names of backend entities.
pub trait Catalog {
    /// Name of a table.
    fn table_name(&self, id: &Uuid) -> Option<String>;
    /// Name of an asset.
    fn asset_name(&self, id: &Uuid) -> Option<String>;
}

/// A fixed, in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tables: HashMap<Uuid, String>,
    assets: HashMap<Uuid, String>,
}

impl StaticCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table name.
    pub fn with_table(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.tables.insert(id, name.into());
        self
    }

    /// Add an asset name.
    pub fn with_asset(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.assets.insert(id, name.into());
        self
    }

    /// Insert or replace a table name.
    pub fn insert_table(&mut self, id: Uuid, name: impl Into<String>) {
        self.tables.insert(id, name.into());
    }

    /// Insert or replace an asset name.
    pub fn insert_asset(&mut self, id: Uuid, name: impl Into<String>) {
        self.assets.insert(id, name.into());
    }
}

impl Catalog for StaticCatalog {
    fn table_name(&self, id: &Uuid) -> Option<String> {
        self.tables.get(id).cloned()
    }

    fn asset_name(&self, id: &Uuid) -> Option<String> {
        self.assets.get(id).cloned()
    }
}

/// Quote `name` as a SQL identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One styled span of a rendering, relative to the start of the rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Paint style.
    pub style: StyleTag,
    /// Span within the rendered text.
    pub range: TextRange,
}

/// The rendered text of a reference and the layout of its ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendering {
    /// Text inserted into the document.
    pub text: String,
    /// Span whose content decides validity (the whole text).
    pub primary: Segment,
    /// Cosmetic sub-spans.
    pub secondaries: Vec<Segment>,
}

impl Rendering {
    /// Range specs for this rendering placed at `offset`, primary first.
    pub fn range_specs(&self, offset: usize, markup: &Markup) -> Vec<RangeSpec> {
        std::iter::once(&self.primary)
            .chain(self.secondaries.iter())
            .map(|segment| {
                RangeSpec::attached(segment.range.offset_by(offset), segment.style, markup.clone())
            })
            .collect()
    }

    /// Text covered by a segment.
    pub fn segment_text(&self, segment: &Segment) -> String {
        self.text
            .chars()
            .skip(segment.range.start)
            .take(segment.range.len())
            .collect()
    }
}

/// Render a reference configuration.
///
/// Unknown ids render as their UUID text.
pub fn render(config: &SourceConfig, catalog: &dyn Catalog) -> Rendering {
    match config {
        SourceConfig::AssetTable(table) => {
            let name = catalog
                .table_name(&table.table_id)
                .unwrap_or_else(|| table.table_id.to_string());
            single_segment(quote_identifier(&name), StyleTag::AssetTable)
        }
        SourceConfig::Timeseries(series) => {
            let asset = quote_identifier(&asset_name(series, catalog));
            match (config.kind(), &series.target) {
                (SourceKind::TimeseriesSingle, Some(target)) => composite(asset, target),
                _ => single_segment(asset, StyleTag::TimeseriesTag),
            }
        }
    }
}

fn asset_name(series: &TimeseriesConfig, catalog: &dyn Catalog) -> String {
    catalog
        .asset_name(&series.asset_id)
        .unwrap_or_else(|| series.asset_id.to_string())
}

fn single_segment(text: String, style: StyleTag) -> Rendering {
    let len = text.chars().count();
    Rendering {
        text,
        primary: Segment {
            style,
            range: TextRange::new(0, len),
        },
        secondaries: Vec::new(),
    }
}

// `"asset"."attribute"`: container, asset tag, dot, attribute tag.
fn composite(asset: String, target: &str) -> Rendering {
    let attribute = quote_identifier(target);
    let asset_len = asset.chars().count();
    let total = asset_len + 1 + attribute.chars().count();

    Rendering {
        text: format!("{asset}.{attribute}"),
        primary: Segment {
            style: StyleTag::TimeseriesContainer,
            range: TextRange::new(0, total),
        },
        secondaries: vec![
            Segment {
                style: StyleTag::TimeseriesTag,
                range: TextRange::new(0, asset_len),
            },
            Segment {
                style: StyleTag::TimeseriesDot,
                range: TextRange::new(asset_len, asset_len + 1),
            },
            Segment {
                style: StyleTag::AttributeTag,
                range: TextRange::new(asset_len + 1, total),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_table(Uuid::nil(), "table_1")
            .with_asset(Uuid::nil(), "asset_1")
    }

    #[test]
    fn test_render_table() {
        let rendering = render(&SourceConfig::table(Uuid::nil()), &catalog());
        assert_eq!(rendering.text, "\"table_1\"");
        assert_eq!(rendering.primary.range, TextRange::new(0, 9));
        assert!(rendering.secondaries.is_empty());
    }

    #[test]
    fn test_render_single_timeseries_layout() {
        let config = SourceConfig::timeseries(Uuid::nil(), Some("pressure".to_string()));
        let rendering = render(&config, &catalog());

        assert_eq!(rendering.text, "\"asset_1\".\"pressure\"");
        assert_eq!(rendering.primary.style, StyleTag::TimeseriesContainer);
        let parts: Vec<String> = rendering
            .secondaries
            .iter()
            .map(|s| rendering.segment_text(s))
            .collect();
        assert_eq!(parts, vec!["\"asset_1\"", ".", "\"pressure\""]);
    }

    #[test]
    fn test_render_escapes_quotes_and_counts_escapes() {
        let id = Uuid::from_u128(7);
        let catalog = StaticCatalog::new().with_asset(id, "we\"ird");
        let config = SourceConfig::timeseries(id, Some("ä\"b".to_string()));
        let rendering = render(&config, &catalog);

        assert_eq!(rendering.text, "\"we\"\"ird\".\"ä\"\"b\"");
        let parts: Vec<String> = rendering
            .secondaries
            .iter()
            .map(|s| rendering.segment_text(s))
            .collect();
        assert_eq!(parts, vec!["\"we\"\"ird\"", ".", "\"ä\"\"b\""]);
    }

    #[test]
    fn test_unknown_ids_render_as_uuid() {
        let id = Uuid::from_u128(42);
        let rendering = render(&SourceConfig::timeseries(id, None), &StaticCatalog::new());
        assert_eq!(rendering.text, format!("\"{id}\""));
        assert_eq!(rendering.primary.style, StyleTag::TimeseriesTag);
    }

    #[test]
    fn test_range_specs_are_offset_and_attached() {
        let config = SourceConfig::timeseries(Uuid::nil(), Some("pressure".to_string()));
        let rendering = render(&config, &catalog());
        let specs = rendering.range_specs(5, &Markup::new("m2"));

        assert_eq!(specs.len(), 4);
        assert_eq!(specs[0].range, TextRange::new(5, 25));
        assert_eq!(specs[2].range, TextRange::new(14, 15));
        assert!(specs.iter().all(|s| s.attached == Some(Markup::new("m2"))));
    }
}
