//! automd - serve HTML as Markdown to AI agents
//!
//! This crate provides a tower middleware that inspects outgoing HTML
//! responses and, when the request looks like it comes from an AI agent
//! rather than a browser, rewrites the body to Markdown.
//!
//! ## Pipeline
//!
//! After the wrapped service responds, the middleware:
//! 1. Skips responses that are already Markdown
//! 2. Classifies the request with a [`Detector`] (header matchers or custom logic)
//! 3. Checks the response content type against the allowed list
//! 4. Buffers the body and converts it with a [`Converter`]
//! 5. Replaces the response, setting `content-type`, the [`MARKER_HEADER`]
//!    and dropping `content-length`
//!
//! Any failure along the way serves the original response unchanged.
//!
//! ## Usage
//!
//! ```ignore
//! use automd::{AutoMarkdownLayer, Detector, HeaderMatcher};
//!
//! let layer = AutoMarkdownLayer::builder()
//!     .detect(Detector::default_with([HeaderMatcher::new("x-internal-bot")]))
//!     .on_convert_error(|err| tracing::warn!(%err, "conversion failed"))
//!     .build()?;
//! let app = axum::Router::new().layer(layer);
//! ```

mod base_url;
mod body;
pub mod config;
mod content_type;
mod convert;
mod detect;
mod error;
mod layer;
mod matcher;
mod rewrite;

pub use base_url::resolve_base_url;
pub use config::{effective_matchers, AutoMarkdownBuilder, AutoMarkdownConfig, ErrorCallback};
pub use content_type::{is_eligible, is_markdown};
pub use convert::{
    html_to_markdown, html_to_markdown_with, Convert, Converter, HtmlToMarkdownOptions,
};
pub use detect::{Detect, Detector, RequestHead};
pub use error::{AutoMarkdownError, BoxError};
pub use layer::{auto_markdown, AutoMarkdownLayer, AutoMarkdownService};
pub use matcher::{default_agent_matchers, matches_any, EmptyMatcherPolicy, HeaderMatcher};

/// Content types converted by default
pub const DEFAULT_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Content type of converted responses
pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

/// Response header set on converted responses
pub const MARKER_HEADER: &str = "x-auto-md";

/// Value of [`MARKER_HEADER`]
pub const MARKER_VALUE: &str = "1";

/// Largest body buffered for conversion by default (10 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
