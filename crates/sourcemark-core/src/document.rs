//! The exchange format.
//!
//! A [`QueryDocument`] is canonical text plus the list of sources its tokens refer to and the
//! query parameters. It is the body of copy/load actions and, extended with arguments
//! ([`ExecuteRequest`]), of the execution backend's POST endpoint.

use crate::decorations::{Position, TextRange};
use crate::error::DocumentError;
use crate::model::{Markup, SourceConfig, SourceType, TableConfig, TimeseriesConfig};
use crate::provider::TrackedRangeProvider;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

/// A 1-based line/column range, as stored in `markupRange`.
///
/// Columns count characters; the end column points just past the last covered character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRange {
    /// First line (1-based).
    pub start_line_number: u32,
    /// First column (1-based).
    pub start_column: u32,
    /// Last line (1-based).
    pub end_line_number: u32,
    /// Column after the last character (1-based).
    pub end_column: u32,
}

impl WireRange {
    /// Describe `range` in the line/column coordinates of `provider`.
    pub fn from_text_range<P>(provider: &P, range: TextRange) -> Self
    where
        P: TrackedRangeProvider + ?Sized,
    {
        let start = provider.char_to_position(range.start);
        let end = provider.char_to_position(range.end);
        Self {
            start_line_number: start.line as u32 + 1,
            start_column: start.column as u32 + 1,
            end_line_number: end.line as u32 + 1,
            end_column: end.column as u32 + 1,
        }
    }

    /// Resolve against `provider`, or `None` if a line or column does not exist there.
    pub fn to_text_range<P>(&self, provider: &P) -> Option<TextRange>
    where
        P: TrackedRangeProvider + ?Sized,
    {
        let start = resolve(provider, self.start_line_number, self.start_column)?;
        let end = resolve(provider, self.end_line_number, self.end_column)?;
        (start <= end).then(|| TextRange::new(start, end))
    }
}

fn resolve<P>(provider: &P, line: u32, column: u32) -> Option<usize>
where
    P: TrackedRangeProvider + ?Sized,
{
    if line == 0 || column == 0 {
        return None;
    }
    provider.position_to_char(Position::new(line as usize - 1, column as usize - 1))
}

/// Why a wire source could not be read.
#[derive(Debug, Error)]
pub enum SourceDtoError {
    /// `sourceConfig` does not match the declared `sourceType`.
    #[error("invalid sourceConfig for {source_type:?}: {source}")]
    InvalidConfig {
        /// Declared type.
        source_type: SourceType,
        /// Deserialization failure.
        source: serde_json::Error,
    },

    /// `sourceId` and the id inside `sourceConfig` disagree.
    #[error("sourceId {source_id} does not match sourceConfig id {config_id}")]
    IdMismatch {
        /// Top-level id.
        source_id: Uuid,
        /// Id inside the config.
        config_id: Uuid,
    },
}

/// One source of a [`QueryDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSourceDto", into = "RawSourceDto")]
pub struct SourceDto {
    /// Markup id of the token this source belongs to.
    pub markup: Markup,
    /// Where the token sits in the canonical query, when known.
    pub markup_range: Option<WireRange>,
    /// Query-time configuration; also determines `sourceType` and `sourceId`.
    pub config: SourceConfig,
}

impl SourceDto {
    /// Wire-level type tag.
    pub fn source_type(&self) -> SourceType {
        self.config.source_type()
    }

    /// Id of the referenced backend entity.
    pub fn source_id(&self) -> Uuid {
        self.config.source_id()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceDto {
    markup: Markup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    markup_range: Option<WireRange>,
    source_type: SourceType,
    source_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_config: Option<Value>,
}

impl TryFrom<RawSourceDto> for SourceDto {
    type Error = SourceDtoError;

    fn try_from(raw: RawSourceDto) -> Result<Self, Self::Error> {
        let config = match raw.source_config {
            None | Some(Value::Null) => SourceConfig::implied(raw.source_type, raw.source_id),
            Some(value) => {
                let invalid = |source| SourceDtoError::InvalidConfig {
                    source_type: raw.source_type,
                    source,
                };
                let config = match raw.source_type {
                    SourceType::AssetTable => SourceConfig::AssetTable(
                        serde_json::from_value::<TableConfig>(value).map_err(invalid)?,
                    ),
                    SourceType::Timeseries => SourceConfig::Timeseries(
                        serde_json::from_value::<TimeseriesConfig>(value).map_err(invalid)?,
                    ),
                };
                if config.source_id() != raw.source_id {
                    return Err(SourceDtoError::IdMismatch {
                        source_id: raw.source_id,
                        config_id: config.source_id(),
                    });
                }
                config
            }
        };

        Ok(Self {
            markup: raw.markup,
            markup_range: raw.markup_range,
            config,
        })
    }
}

impl From<SourceDto> for RawSourceDto {
    fn from(dto: SourceDto) -> Self {
        let source_config = match &dto.config {
            SourceConfig::AssetTable(config) => serde_json::to_value(config),
            SourceConfig::Timeseries(config) => serde_json::to_value(config),
        }
        .ok();

        Self {
            source_type: dto.config.source_type(),
            source_id: dto.config.source_id(),
            markup: dto.markup,
            markup_range: dto.markup_range,
            source_config,
        }
    }
}

/// Data type of a query parameter.
///
/// Wire names are lowercase; names this crate does not know are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    /// Free text.
    Text,
    /// Integer.
    Int,
    /// Floating point.
    Double,
    /// `true`/`false`.
    Boolean,
    /// Timestamp.
    DateTime,
    /// Any other type name.
    Other(String),
}

impl DataType {
    /// The wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Int => "int",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for DataType {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "int" => Self::Int,
            "double" => Self::Double,
            "boolean" => Self::Boolean,
            "datetime" => Self::DateTime,
            _ => Self::Other(name),
        }
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// A named query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    /// Opaque key; generated when the document carries none.
    #[serde(default = "new_parameter_id")]
    pub id: String,
    /// Name used in the query and in arguments.
    pub name: String,
    /// Declared type.
    pub data_type: DataType,
    /// Value used when no argument is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

fn new_parameter_id() -> String {
    Uuid::new_v4().to_string()
}

impl Parameter {
    /// Create a parameter with a fresh id.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: new_parameter_id(),
            name: name.into(),
            data_type,
            default_value: None,
        }
    }
}

/// Canonical text, its sources and its parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryDocument {
    /// Canonical text with `{{markup}}` tokens.
    pub query: String,
    /// Sources in token order.
    #[serde(default)]
    pub sources: Vec<SourceDto>,
    /// Query parameters.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl QueryDocument {
    /// Parse a document from JSON.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every token has exactly one source and every source exactly one token.
    pub fn validate(&self) -> Result<(), DocumentError> {
        let mut counts: HashMap<Markup, usize> = HashMap::new();
        for occurrence in token_census(&self.query) {
            *counts.entry(occurrence.markup).or_default() += 1;
        }

        let mut seen = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            if seen.contains(&&source.markup) {
                return Err(DocumentError::DuplicateToken(source.markup.clone(), 2));
            }
            seen.push(&source.markup);
            match counts.get(&source.markup) {
                None => return Err(DocumentError::SourceWithoutToken(source.markup.clone())),
                Some(&n) if n > 1 => {
                    return Err(DocumentError::DuplicateToken(source.markup.clone(), n));
                }
                Some(_) => {}
            }
        }

        // Report orphans in text order.
        for occurrence in token_census(&self.query) {
            if !seen.contains(&&occurrence.markup) {
                return Err(DocumentError::TokenWithoutSource(occurrence.markup));
            }
        }
        Ok(())
    }
}

/// One `{{markup}}` token found in canonical text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOccurrence {
    /// Markup inside the braces.
    pub markup: Markup,
    /// Char range of the token, surrounding quotes included when present.
    pub range: TextRange,
    /// Quote wrapping the token, if any.
    pub quote: Option<char>,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(["']?)\{\{([^{}\s]+)\}\}(["']?)"#).expect("valid token regex")
    })
}

/// Every token of `query`, in text order.
pub fn token_census(query: &str) -> Vec<TokenOccurrence> {
    let mut occurrences = Vec::new();
    // Byte offsets from the regex are turned into char offsets incrementally.
    let mut chars_before = 0;
    let mut bytes_seen = 0;

    for captures in token_pattern().captures_iter(query) {
        let (Some(whole), Some(markup)) = (captures.get(0), captures.get(2)) else {
            continue;
        };
        let open = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        let close = captures.get(3).map(|m| m.as_str()).unwrap_or("");

        let (quote, byte_start, byte_end) = if !open.is_empty() && open == close {
            (open.chars().next(), whole.start(), whole.end())
        } else {
            (
                None,
                whole.start() + open.len(),
                whole.end() - close.len(),
            )
        };

        chars_before += query[bytes_seen..byte_start].chars().count();
        let len = query[byte_start..byte_end].chars().count();
        bytes_seen = byte_start;

        occurrences.push(TokenOccurrence {
            markup: Markup::new(markup.as_str()),
            range: TextRange::new(chars_before, chars_before + len),
            quote,
        });
    }
    occurrences
}

/// One argument bound to a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
    /// Parameter name.
    pub parameter_name: String,
    /// Supplied value.
    pub value: Value,
}

/// Body of an execution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Canonical text.
    pub query: String,
    /// Sources in token order.
    pub sources: Vec<SourceDto>,
    /// Query parameters.
    pub parameters: Vec<Parameter>,
    /// Arguments keyed by trimmed parameter name.
    pub arguments: BTreeMap<String, Argument>,
}

impl ExecuteRequest {
    /// Build a request from a document and raw `(name, value)` arguments.
    ///
    /// Names are trimmed; arguments with an empty name or a null/empty value are dropped.
    pub fn new(document: QueryDocument, arguments: impl IntoIterator<Item = (String, Value)>) -> Self {
        let arguments = arguments
            .into_iter()
            .filter_map(|(name, value)| {
                let name = name.trim().to_string();
                let empty = match &value {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    _ => false,
                };
                (!name.is_empty() && !empty).then(|| {
                    (
                        name.clone(),
                        Argument {
                            parameter_name: name,
                            value,
                        },
                    )
                })
            })
            .collect();

        Self {
            query: document.query,
            sources: document.sources,
            parameters: document.parameters,
            arguments,
        }
    }
}

/// A result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Backend-specific type name.
    #[serde(default)]
    pub underlying_data_type: String,
    /// Portable type name.
    #[serde(default)]
    pub generic_data_type: String,
}

/// Body of an execution response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Result columns.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Rows, one value per column.
    #[serde(default)]
    pub records: Vec<Vec<Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TextBuffer;
    use crate::model::{SourceKind, TimeseriesMode};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_source_without_config_is_implied() {
        let doc = QueryDocument::from_json(
            r#"{"query":"select * from \"{{m1}}\"","sources":[
                {"markup":"m1","sourceType":"asset_table","sourceId":"00000000-0000-0000-0000-000000000000"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(doc.sources[0].config, SourceConfig::table(Uuid::nil()));
        assert!(doc.sources[0].markup_range.is_none());
        assert!(doc.parameters.is_empty());
    }

    #[test]
    fn test_timeseries_config_on_the_wire() {
        let dto = SourceDto {
            markup: Markup::new("m2"),
            markup_range: Some(WireRange {
                start_line_number: 1,
                start_column: 15,
                end_line_number: 1,
                end_column: 23,
            }),
            config: SourceConfig::timeseries(Uuid::nil(), Some("pressure".to_string())),
        };

        let value = serde_json::to_value(&dto).unwrap();
        assert_eq!(
            value,
            json!({
                "markup": "m2",
                "markupRange": {
                    "startLineNumber": 1,
                    "startColumn": 15,
                    "endLineNumber": 1,
                    "endColumn": 23
                },
                "sourceType": "timeseries",
                "sourceId": "00000000-0000-0000-0000-000000000000",
                "sourceConfig": {
                    "assetId": "00000000-0000-0000-0000-000000000000",
                    "target": "pressure",
                    "mode": "single"
                }
            })
        );

        let back: SourceDto = serde_json::from_value(value).unwrap();
        assert_eq!(back.config.kind(), SourceKind::TimeseriesSingle);
    }

    #[test]
    fn test_mismatched_ids_are_rejected() {
        let result = serde_json::from_value::<SourceDto>(json!({
            "markup": "m1",
            "sourceType": "timeseries",
            "sourceId": "00000000-0000-0000-0000-000000000001",
            "sourceConfig": {"assetId": "00000000-0000-0000-0000-000000000002"}
        }));
        let message = result.unwrap_err().to_string();
        assert!(message.contains("does not match"), "{message}");
    }

    #[test]
    fn test_missing_mode_defaults_to_multiple() {
        let dto: SourceDto = serde_json::from_value(json!({
            "markup": "m1",
            "sourceType": "timeseries",
            "sourceId": "00000000-0000-0000-0000-000000000000",
            "sourceConfig": {"assetId": "00000000-0000-0000-0000-000000000000"}
        }))
        .unwrap();
        match dto.config {
            SourceConfig::Timeseries(config) => assert_eq!(config.mode, TimeseriesMode::Multiple),
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn test_token_census_reports_char_ranges_and_quotes() {
        let census = token_census("ä \"{{m1}}\" join '{{m2}}' {{m3}} \"{{m4}}'");
        let found: Vec<(&str, TextRange, Option<char>)> = census
            .iter()
            .map(|o| (o.markup.as_str(), o.range, o.quote))
            .collect();

        assert_eq!(
            found,
            vec![
                ("m1", TextRange::new(2, 10), Some('"')),
                ("m2", TextRange::new(16, 24), Some('\'')),
                ("m3", TextRange::new(25, 31), None),
                ("m4", TextRange::new(33, 39), None),
            ]
        );
    }

    #[test]
    fn test_validate_correspondence() {
        let source = |m: &str| SourceDto {
            markup: Markup::new(m),
            markup_range: None,
            config: SourceConfig::table(Uuid::nil()),
        };
        let mut doc = QueryDocument {
            query: "\"{{m1}}\" \"{{m2}}\"".to_string(),
            sources: vec![source("m1"), source("m2")],
            parameters: Vec::new(),
        };
        assert!(doc.validate().is_ok());

        doc.sources.pop();
        assert!(matches!(doc.validate(), Err(DocumentError::TokenWithoutSource(m)) if m.as_str() == "m2"));

        doc.sources.push(source("m3"));
        assert!(matches!(doc.validate(), Err(DocumentError::SourceWithoutToken(m)) if m.as_str() == "m3"));

        doc.query = "{{m1}} {{m1}} {{m3}}".to_string();
        assert!(matches!(doc.validate(), Err(DocumentError::DuplicateToken(_, 2))));
    }

    #[test]
    fn test_wire_range_round_trips_through_buffer() {
        let buffer = TextBuffer::from_text("select *\nfrom \"{{m1}}\"");
        let range = TextRange::new(14, 22);
        let wire = WireRange::from_text_range(&buffer, range);

        assert_eq!(
            wire,
            WireRange {
                start_line_number: 2,
                start_column: 6,
                end_line_number: 2,
                end_column: 14,
            }
        );
        assert_eq!(wire.to_text_range(&buffer), Some(range));

        let beyond = WireRange {
            end_column: 40,
            ..wire
        };
        assert_eq!(beyond.to_text_range(&buffer), None);
    }

    #[test]
    fn test_execute_request_filters_arguments() {
        let request = ExecuteRequest::new(
            QueryDocument::default(),
            vec![
                (" limit ".to_string(), json!(10)),
                ("".to_string(), json!("x")),
                ("from".to_string(), json!("")),
                ("to".to_string(), Value::Null),
            ],
        );

        assert_eq!(request.arguments.len(), 1);
        assert_eq!(
            request.arguments["limit"],
            Argument {
                parameter_name: "limit".to_string(),
                value: json!(10),
            }
        );
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["arguments"]["limit"]["parameterName"], "limit");
    }

    #[test]
    fn test_parameters_with_string_keys_or_no_id() {
        let doc = QueryDocument::from_json(
            r#"{"query": "select 1", "parameters": [
                {"id": "1", "name": "limit", "dataType": "int", "defaultValue": 10},
                {"name": "site", "dataType": "string"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(doc.parameters[0].id, "1");
        assert_eq!(doc.parameters[0].data_type, DataType::Int);
        assert_eq!(doc.parameters[0].default_value, Some(Value::from(10)));
        assert!(!doc.parameters[1].id.is_empty());
        assert_eq!(doc.parameters[1].data_type, DataType::Other("string".to_string()));

        let body = serde_json::to_value(&doc).unwrap();
        assert_eq!(body["parameters"][0]["dataType"], "int");
        assert_eq!(body["parameters"][1]["dataType"], "string");
    }

    #[test]
    fn test_parse_response() {
        let response: ExecuteResponse = serde_json::from_str(
            r#"{"columns":[{"name":"ts","underlyingDataType":"timestamptz","genericDataType":"datetime"}],
                "records":[["2024-01-01T00:00:00Z"]]}"#,
        )
        .unwrap();
        assert_eq!(response.columns[0].generic_data_type, "datetime");
        assert_eq!(response.records.len(), 1);
    }
}
