#![warn(missing_docs)]
//! Sourcemark Core - Headless Source-Reference Engine for Query Text
//!
//! # Overview
//!
//! `sourcemark-core` lets a text surface host inline references to backend data entities
//! (tables, time series). References render as readable quoted names, follow the text as it is
//! edited, are dropped as soon as an edit corrupts them, and convert to and from a canonical
//! form in which every reference is a stable `{{markup}}` token.
//!
//! It does not render anything. The hosting editor implements [`TrackedRangeProvider`]; a
//! rope-backed [`TextBuffer`] is included for headless use and as the conversion scratch
//! surface.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Session (QuerySession)                     │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Conversion (canonicalize / materialize)    │  ← Exchange Format
//! ├─────────────────────────────────────────────┤
//! │  Invalidation (debounced, region-based)     │  ← Reference Validity
//! ├─────────────────────────────────────────────┤
//! │  Reference Registry                         │  ← Reference Storage
//! ├─────────────────────────────────────────────┤
//! │  Tracked Ranges (TrackedRangeProvider)      │  ← Position Tracking
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use sourcemark_core::{QuerySession, SessionConfig, StaticCatalog, TextBuffer, TextRange};
//! use uuid::Uuid;
//!
//! let mut session = QuerySession::new(TextBuffer::new(), &SessionConfig::default());
//! session.set_catalog(StaticCatalog::new().with_table(Uuid::nil(), "table_1"));
//!
//! let markup = session.insert_table(TextRange::empty(0), Uuid::nil()).unwrap();
//! assert_eq!(session.text(), "\"table_1\"");
//!
//! let document = session.export().unwrap();
//! assert_eq!(document.query, "\"{{m1}}\"");
//! assert_eq!(document.sources[0].markup, markup);
//! ```
//!
//! # Module Description
//!
//! - [`decorations`] - Ranges, positions, styles and edits
//! - [`intervals`] - Sorted store of tracked ranges and their relocation rules
//! - [`buffer`] - Rope-backed text surface with tracked ranges
//! - [`provider`] - Tracked-range capability and scratch surfaces
//! - [`registry`] - Active references keyed by markup
//! - [`invalidate`] - Edit-driven purging of stale references
//! - [`debounce`] - Quiescence-window coalescing
//! - [`render`] - Rendered form of references
//! - [`convert`] - Canonicalize and materialize
//! - [`document`] - The exchange format
//! - [`session`] - The editing session
//! - [`config`] - TOML configuration

pub mod buffer;
pub mod config;
pub mod convert;
pub mod debounce;
pub mod decorations;
pub mod delta;
pub mod document;
pub mod error;
pub mod intervals;
pub mod invalidate;
pub mod model;
pub mod provider;
pub mod registry;
pub mod render;
pub mod session;

pub use buffer::TextBuffer;
pub use config::{BackendConfig, CatalogConfig, Config, DEFAULT_CONFIG, SessionConfig};
pub use convert::{
    CanonicalForm, MarkupConverter, MaterializePlan, MaterializeReport, PlannedRange,
    PlannedReference, SkipReason, SkippedSource,
};
pub use debounce::{DEFAULT_DEBOUNCE_WINDOW, Debouncer};
pub use decorations::{Position, RangeEdit, RangeId, RangeSpec, StyleTag, TextRange};
pub use delta::{Bias, ChangeBatch, ContentChange};
pub use document::{
    Argument, Column, DataType, ExecuteRequest, ExecuteResponse, Parameter, QueryDocument,
    SourceDto, TokenOccurrence, WireRange, token_census,
};
pub use error::{
    BufferError, ConfigError, ConvertError, DocumentError, RegistryError, SessionError,
};
pub use intervals::{RangeTree, TrackedInterval};
pub use invalidate::{EditInvalidator, InvalidationPolicy, InvalidationReport, Purge, PurgeReason};
pub use model::{
    Markup, MarkupGenerator, SecondaryRange, SourceConfig, SourceKind, SourceReference,
    SourceType, TableConfig, TimeseriesConfig, TimeseriesMode,
};
pub use provider::{InMemoryScratch, ScratchFactory, TrackedRangeProvider};
pub use registry::ReferenceRegistry;
pub use render::{Catalog, Rendering, Segment, StaticCatalog, quote_identifier, render};
pub use session::QuerySession;
