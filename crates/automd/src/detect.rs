//! Agent detection
//!
//! Design: a [`Detector`] is either a declarative matcher list or a custom
//! [`Detect`] implementation. The middleware dispatches on the variant; custom
//! detectors replace the matcher list entirely.

use crate::error::{AutoMarkdownError, BoxError};
use crate::matcher::{default_agent_matchers, matches_any, EmptyMatcherPolicy, HeaderMatcher};
use async_trait::async_trait;
use axum::http::header::HOST;
use axum::http::{HeaderMap, Method, Request, Uri, Version};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Snapshot of the request a response belongs to
///
/// Taken before the request is handed to the wrapped service, so the
/// detector and the base URL resolver can run once the response exists.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// HTTP method
    pub method: Method,
    /// Request URI as received
    pub uri: Uri,
    /// HTTP version
    pub version: Version,
    /// Request headers
    pub headers: HeaderMap,
}

impl RequestHead {
    /// Capture the head of a request
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
        }
    }

    /// Get a header value as a string, if present and readable
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The request URL as seen by the client
    ///
    /// Absolute URIs are used as is. Otherwise the URL is rebuilt from
    /// `x-forwarded-proto` (default `http`), the `host` header and the path.
    /// Without a host the bare URI is returned, which is not absolute.
    pub fn url(&self) -> String {
        if self.uri.scheme().is_some() && self.uri.authority().is_some() {
            return self.uri.to_string();
        }

        let host = self
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|h| !h.is_empty());
        let Some(host) = host else {
            return self.uri.to_string();
        };

        let scheme = self
            .header("x-forwarded-proto")
            .and_then(|p| p.split(',').next())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("http");
        let path = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        format!("{}://{}{}", scheme, host, path)
    }
}

/// Trait for custom agent detectors
///
/// Implement this trait when header matching is not enough, e.g. to consult
/// an allow list or an external service.
#[async_trait]
pub trait Detect: Send + Sync {
    /// Returns true if the request comes from an agent client
    async fn detect(&self, request: &RequestHead) -> Result<bool, BoxError>;
}

struct FnDetect<F>(F);

#[async_trait]
impl<F> Detect for FnDetect<F>
where
    F: Fn(&RequestHead) -> bool + Send + Sync,
{
    async fn detect(&self, request: &RequestHead) -> Result<bool, BoxError> {
        Ok((self.0)(request))
    }
}

struct AsyncFnDetect<F>(F);

#[async_trait]
impl<F, Fut, E> Detect for AsyncFnDetect<F>
where
    F: Fn(RequestHead) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn detect(&self, request: &RequestHead) -> Result<bool, BoxError> {
        (self.0)(request.clone()).await.map_err(Into::into)
    }
}

/// How requests are classified as agent or browser
#[derive(Clone)]
pub enum Detector {
    /// Declarative header matchers
    Matchers(Vec<HeaderMatcher>),
    /// Custom detection logic
    Predicate(Arc<dyn Detect>),
}

impl Default for Detector {
    fn default() -> Self {
        Detector::Matchers(default_agent_matchers())
    }
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detector::Matchers(matchers) => f.debug_tuple("Matchers").field(matchers).finish(),
            Detector::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<Vec<HeaderMatcher>> for Detector {
    fn from(matchers: Vec<HeaderMatcher>) -> Self {
        Detector::Matchers(matchers)
    }
}

impl Detector {
    /// Use the given matchers instead of the built-in list
    pub fn matchers(matchers: impl IntoIterator<Item = HeaderMatcher>) -> Self {
        Detector::Matchers(matchers.into_iter().collect())
    }

    /// Use the built-in matchers followed by the given ones
    pub fn default_with(extra: impl IntoIterator<Item = HeaderMatcher>) -> Self {
        let mut matchers = default_agent_matchers();
        matchers.extend(extra);
        Detector::Matchers(matchers)
    }

    /// Use a synchronous predicate
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&RequestHead) -> bool + Send + Sync + 'static,
    {
        Detector::Predicate(Arc::new(FnDetect(f)))
    }

    /// Use an asynchronous, fallible predicate
    pub fn async_predicate<F, Fut, E>(f: F) -> Self
    where
        F: Fn(RequestHead) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Detector::Predicate(Arc::new(AsyncFnDetect(f)))
    }

    /// Use a custom [`Detect`] implementation
    pub fn custom(detect: impl Detect + 'static) -> Self {
        Detector::Predicate(Arc::new(detect))
    }

    /// Classify a request
    ///
    /// Matcher lists cannot fail. Errors from custom detectors are returned
    /// to the caller, which treats them as "not an agent".
    pub async fn classify(
        &self,
        request: &RequestHead,
        policy: EmptyMatcherPolicy,
    ) -> Result<bool, AutoMarkdownError> {
        match self {
            Detector::Matchers(matchers) => Ok(matches_any(&request.headers, matchers, policy)),
            Detector::Predicate(detect) => detect
                .detect(request)
                .await
                .map_err(AutoMarkdownError::Detect),
        }
    }
}
