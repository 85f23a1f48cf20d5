//! Error types for automd

use thiserror::Error;

/// Boxed error returned by custom detectors and converters
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while deciding on or performing a rewrite
///
/// None of these ever reach the client: the middleware reports them to the
/// configured callbacks and serves the original response instead.
#[derive(Debug, Error)]
pub enum AutoMarkdownError {
    /// Custom detector failed
    #[error("Agent detection failed: {0}")]
    Detect(#[source] BoxError),

    /// Response body could not be read
    #[error("Failed to read response body")]
    ReadBody(#[source] axum::Error),

    /// Custom converter failed
    #[error("Markdown conversion failed: {0}")]
    Convert(#[source] BoxError),

    /// Configured response content type is not a valid header value
    #[error("Invalid response content type: {0:?}")]
    InvalidContentType(String),
}

impl AutoMarkdownError {
    /// Wrap a detector error
    pub fn detect(err: impl Into<BoxError>) -> Self {
        AutoMarkdownError::Detect(err.into())
    }

    /// Wrap a converter error
    pub fn convert(err: impl Into<BoxError>) -> Self {
        AutoMarkdownError::Convert(err.into())
    }
}
