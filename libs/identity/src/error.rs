//! Error types for identity parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identity string is empty.
    #[error("identity cannot be empty")]
    Empty,

    /// The identity does not belong to the expected set.
    #[error("identity '{actual}' does not belong to set '{set}'")]
    ForeignSet { set: String, actual: String },

    /// The identity is missing its ordinal suffix.
    #[error("identity '{0}' is missing an ordinal suffix")]
    MissingOrdinal(String),

    /// The ordinal suffix is not a valid number.
    #[error("invalid ordinal '{ordinal}' in identity '{name}'")]
    InvalidOrdinal { name: String, ordinal: String },

    /// A name segment contains characters outside `[a-z0-9-]`.
    #[error("invalid name segment '{0}': must be lowercase alphanumeric or '-'")]
    InvalidSegment(String),

    /// The ULID portion of a request ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// The request ID is missing its `req_` prefix.
    #[error("request ID missing 'req_' prefix: got '{0}'")]
    MissingPrefix(String),
}
