//! Error types for spec loading, request decoding, and template rendering.

use thiserror::Error;

/// Errors raised while loading or validating a mock specification.
///
/// A `SpecError` is fatal to the load but never to the process: the caller
/// keeps whatever generator was previously installed.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read spec file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse spec JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid spec: {0}")]
    Schema(String),

    #[error("failed to compile pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("status code {0} is outside the range 100-599")]
    Status(u16),

    #[error("the Server header is reserved; use global.serverHeader instead")]
    ReservedHeader,
}

/// Errors raised when a caller asks for a decoded request body.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while rendering a content template against path captures.
///
/// These are request-time failures: the response maker converts them into a
/// 500 response whose body is the error description.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template references capture group {index} but the pattern has {available}")]
    IndexOutOfRange { index: usize, available: usize },

    #[error("invalid placeholder field {0:?}")]
    Field(String),

    #[error("cannot switch between automatic and manual placeholder numbering")]
    MixedNumbering,

    #[error("single {0:?} encountered in template")]
    UnmatchedBrace(char),

    #[error("failed to encode interpolated content as JSON: {0}")]
    Encode(#[from] serde_json::Error),
}
