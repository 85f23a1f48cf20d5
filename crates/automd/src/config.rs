//! Middleware configuration
//!
//! [`AutoMarkdownBuilder`] is the programmatic surface and accepts custom
//! detectors, converters and callbacks. [`AutoMarkdownConfig`] is the
//! declarative subset that can be loaded from JSON.

use crate::convert::{Converter, HtmlToMarkdownOptions};
use crate::detect::Detector;
use crate::error::AutoMarkdownError;
use crate::layer::AutoMarkdownLayer;
use crate::matcher::{default_agent_matchers, EmptyMatcherPolicy, HeaderMatcher};
use crate::{DEFAULT_CONTENT_TYPES, DEFAULT_MAX_BODY_BYTES, MARKDOWN_CONTENT_TYPE};
use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Callback notified when detection or conversion fails
pub type ErrorCallback = Arc<dyn Fn(&AutoMarkdownError) + Send + Sync>;

/// Resolved, immutable settings shared by every request
pub(crate) struct Settings {
    pub(crate) detector: Detector,
    pub(crate) converter: Converter,
    pub(crate) allowed_content_types: Vec<String>,
    pub(crate) response_content_type: HeaderValue,
    pub(crate) empty_matcher_policy: EmptyMatcherPolicy,
    pub(crate) max_body_bytes: usize,
    pub(crate) on_detect_error: Option<ErrorCallback>,
    pub(crate) on_convert_error: Option<ErrorCallback>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            detector: Detector::default(),
            converter: Converter::default(),
            allowed_content_types: default_content_types(),
            response_content_type: HeaderValue::from_static(MARKDOWN_CONTENT_TYPE),
            empty_matcher_policy: EmptyMatcherPolicy::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            on_detect_error: None,
            on_convert_error: None,
        }
    }
}

fn default_content_types() -> Vec<String> {
    DEFAULT_CONTENT_TYPES.iter().map(|s| s.to_string()).collect()
}

/// Builder for configuring the middleware
#[derive(Clone)]
pub struct AutoMarkdownBuilder {
    detector: Detector,
    converter: Converter,
    allowed_content_types: Vec<String>,
    response_content_type: String,
    empty_matcher_policy: EmptyMatcherPolicy,
    max_body_bytes: usize,
    on_detect_error: Option<ErrorCallback>,
    on_convert_error: Option<ErrorCallback>,
}

impl Default for AutoMarkdownBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AutoMarkdownBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoMarkdownBuilder")
            .field("detector", &self.detector)
            .field("converter", &self.converter)
            .field("allowed_content_types", &self.allowed_content_types)
            .field("response_content_type", &self.response_content_type)
            .field("empty_matcher_policy", &self.empty_matcher_policy)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

impl AutoMarkdownBuilder {
    /// Create a builder with every option at its default
    pub fn new() -> Self {
        Self {
            detector: Detector::default(),
            converter: Converter::default(),
            allowed_content_types: default_content_types(),
            response_content_type: MARKDOWN_CONTENT_TYPE.to_string(),
            empty_matcher_policy: EmptyMatcherPolicy::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            on_detect_error: None,
            on_convert_error: None,
        }
    }

    /// Set how agent clients are detected
    pub fn detect(mut self, detector: impl Into<Detector>) -> Self {
        self.detector = detector.into();
        self
    }

    /// Set the converter (built-in options or a full override)
    pub fn html_to_markdown(mut self, converter: impl Into<Converter>) -> Self {
        self.converter = converter.into();
        self
    }

    /// Set the content types eligible for conversion
    pub fn allowed_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_content_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Set the content type of converted responses
    pub fn response_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.response_content_type = content_type.into();
        self
    }

    /// Set what a matcher without rules means
    pub fn empty_matcher_policy(mut self, policy: EmptyMatcherPolicy) -> Self {
        self.empty_matcher_policy = policy;
        self
    }

    /// Set the largest body that will be buffered for conversion
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Notify on detector failures
    pub fn on_detect_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&AutoMarkdownError) + Send + Sync + 'static,
    {
        self.on_detect_error = Some(Arc::new(f));
        self
    }

    /// Notify on body read and converter failures
    pub fn on_convert_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&AutoMarkdownError) + Send + Sync + 'static,
    {
        self.on_convert_error = Some(Arc::new(f));
        self
    }

    /// Build the layer
    ///
    /// Fails only if the response content type is not a valid header value.
    pub fn build(self) -> Result<AutoMarkdownLayer, AutoMarkdownError> {
        let response_content_type =
            HeaderValue::from_str(&self.response_content_type).map_err(|_| {
                AutoMarkdownError::InvalidContentType(self.response_content_type.clone())
            })?;

        Ok(AutoMarkdownLayer::from_settings(Settings {
            detector: self.detector,
            converter: self.converter,
            allowed_content_types: self.allowed_content_types,
            response_content_type,
            empty_matcher_policy: self.empty_matcher_policy,
            max_body_bytes: self.max_body_bytes,
            on_detect_error: self.on_detect_error,
            on_convert_error: self.on_convert_error,
        }))
    }
}

/// Declarative configuration, loadable from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoMarkdownConfig {
    /// Header matchers; the built-in list when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matchers: Option<Vec<HeaderMatcher>>,
    /// Put the built-in matchers in front of `matchers`
    pub extend_default_matchers: bool,
    /// What a matcher without rules means
    pub empty_matcher_policy: EmptyMatcherPolicy,
    /// Content types eligible for conversion
    pub allowed_content_types: Vec<String>,
    /// Content type of converted responses
    pub response_content_type: String,
    /// Built-in converter options
    pub html_to_markdown: HtmlToMarkdownOptions,
    /// Largest body that will be buffered for conversion
    pub max_body_bytes: usize,
}

impl Default for AutoMarkdownConfig {
    fn default() -> Self {
        Self {
            matchers: None,
            extend_default_matchers: false,
            empty_matcher_policy: EmptyMatcherPolicy::default(),
            allowed_content_types: default_content_types(),
            response_content_type: MARKDOWN_CONTENT_TYPE.to_string(),
            html_to_markdown: HtmlToMarkdownOptions::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl AutoMarkdownConfig {
    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The header matchers described by this configuration
    pub fn header_matchers(&self) -> Vec<HeaderMatcher> {
        match &self.matchers {
            None => default_agent_matchers(),
            Some(matchers) if self.extend_default_matchers => {
                let mut all = default_agent_matchers();
                all.extend(matchers.iter().cloned());
                all
            }
            Some(matchers) => matchers.clone(),
        }
    }

    /// The detector described by this configuration
    pub fn detector(&self) -> Detector {
        Detector::Matchers(self.header_matchers())
    }

    /// Turn the configuration into a builder, to attach callbacks or custom logic
    pub fn into_builder(self) -> AutoMarkdownBuilder {
        let detector = self.detector();
        AutoMarkdownBuilder::new()
            .detect(detector)
            .html_to_markdown(self.html_to_markdown)
            .allowed_content_types(self.allowed_content_types)
            .response_content_type(self.response_content_type)
            .empty_matcher_policy(self.empty_matcher_policy)
            .max_body_bytes(self.max_body_bytes)
    }
}

/// Matchers a configuration would use, for tools that only classify
pub fn effective_matchers(config: &AutoMarkdownConfig) -> Vec<HeaderMatcher> {
    config.header_matchers()
}
