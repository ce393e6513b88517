//! Error types.
//!
//! Stale or unresolved references are not errors: the invalidator purges them and reports the
//! purge in an [`InvalidationReport`](crate::InvalidationReport).

use crate::decorations::{RangeId, TextRange};
use crate::model::Markup;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors produced by a tracked-range provider.
pub enum BufferError {
    #[error("range {}..{} is outside the document (length {len})", .range.start, .range.end)]
    /// A range does not fit the current text.
    OutOfBounds {
        /// The offending range.
        range: TextRange,
        /// Current document length in characters.
        len: usize,
    },

    #[error("edits at {}..{} and {}..{} overlap", .first.start, .first.end, .second.start, .second.end)]
    /// Two edits of one batch overlap.
    OverlappingEdits {
        /// The earlier edit.
        first: TextRange,
        /// The later edit.
        second: TextRange,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors produced by the reference registry.
pub enum RegistryError {
    #[error("markup '{0}' is already registered")]
    /// Re-registering an existing markup.
    DuplicateMarkup(Markup),

    #[error("range {range:?} already belongs to reference '{owner}'")]
    /// A tracked range would belong to two references.
    RangeAlreadyOwned {
        /// The contested range.
        range: RangeId,
        /// Its current owner.
        owner: Markup,
    },

    #[error("no reference with markup '{0}'")]
    /// The markup is not registered.
    UnknownMarkup(Markup),
}

#[derive(Debug, Error)]
/// Errors produced while converting between rendered and canonical text.
pub enum ConvertError {
    #[error("scratch buffer did not become ready within {timeout_ms} ms")]
    /// The scratch surface never signalled readiness.
    ConversionTimeout {
        /// Readiness deadline that expired.
        timeout_ms: u64,
    },

    #[error("document lists markup '{0}' more than once")]
    /// A document carries two sources with the same markup.
    DuplicateMarkup(Markup),

    #[error("scratch range of '{0}' disappeared during conversion")]
    /// The scratch surface dropped a range the conversion was tracking.
    LostRange(Markup),

    #[error("buffer error: {0}")]
    /// A provider rejected an edit or range.
    Buffer(#[from] BufferError),

    #[error("registry error: {0}")]
    /// Registering a converted reference failed.
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
/// Errors produced by session operations.
pub enum SessionError {
    #[error("reference '{0}' no longer resolves to a range")]
    /// The reference's primary range is gone.
    UnresolvedRange(Markup),

    #[error(transparent)]
    /// Registry failure.
    Registry(#[from] RegistryError),

    #[error(transparent)]
    /// Provider failure.
    Buffer(#[from] BufferError),

    #[error(transparent)]
    /// Conversion failure.
    Convert(#[from] ConvertError),
}

#[derive(Debug, Error)]
/// Errors produced while reading or checking an exchange document.
pub enum DocumentError {
    #[error("JSON error: {0}")]
    /// The document is not valid JSON or does not match the exchange schema.
    Json(#[from] serde_json::Error),

    #[error("token {{{{{0}}}}} has no matching source")]
    /// An orphan token in the query.
    TokenWithoutSource(Markup),

    #[error("source '{0}' has no token in the query")]
    /// A source never referenced by the query.
    SourceWithoutToken(Markup),

    #[error("token {{{{{0}}}}} appears {1} times")]
    /// A token referenced more than once.
    DuplicateToken(Markup, usize),
}

#[derive(Debug, Error)]
/// Errors produced while loading configuration.
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    /// Reading the file failed.
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    /// The TOML is invalid.
    Parse(#[from] toml::de::Error),
}
