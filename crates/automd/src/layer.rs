//! Tower layer and service
//!
//! The service snapshots the request head, lets the wrapped service produce
//! its response, then hands both to the rewrite pipeline.

use crate::config::{AutoMarkdownBuilder, AutoMarkdownConfig, Settings};
use crate::detect::RequestHead;
use crate::error::{AutoMarkdownError, BoxError};
use axum::body::{Body, HttpBody};
use axum::http::{Request, Response};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Layer that serves HTML responses as Markdown to agent clients
///
/// ```ignore
/// use automd::AutoMarkdownLayer;
/// use axum::{response::Html, routing::get, Router};
///
/// let app: Router = Router::new()
///     .route("/", get(|| async { Html("<h1>Hello!</h1>") }))
///     .layer(AutoMarkdownLayer::new());
/// ```
#[derive(Clone)]
pub struct AutoMarkdownLayer {
    settings: Arc<Settings>,
}

impl Default for AutoMarkdownLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoMarkdownLayer {
    /// Create a layer with the default configuration
    pub fn new() -> Self {
        Self::from_settings(Settings::default())
    }

    /// Create a builder
    pub fn builder() -> AutoMarkdownBuilder {
        AutoMarkdownBuilder::new()
    }

    /// Create a layer from a declarative configuration
    pub fn from_config(config: AutoMarkdownConfig) -> Result<Self, AutoMarkdownError> {
        config.into_builder().build()
    }

    pub(crate) fn from_settings(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

/// Build a layer from a builder
///
/// Shorthand for [`AutoMarkdownBuilder::build`], for call sites that read
/// better as a function.
pub fn auto_markdown(builder: AutoMarkdownBuilder) -> Result<AutoMarkdownLayer, AutoMarkdownError> {
    builder.build()
}

impl<S> Layer<S> for AutoMarkdownLayer {
    type Service = AutoMarkdownService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AutoMarkdownService {
            inner,
            settings: self.settings.clone(),
        }
    }
}

/// Service produced by [`AutoMarkdownLayer`]
#[derive(Clone)]
pub struct AutoMarkdownService<S> {
    inner: S,
    settings: Arc<Settings>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AutoMarkdownService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let head = RequestHead::from_request(&req);
        let settings = self.settings.clone();

        // The clone that was driven to readiness is the one that must be called
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = inner.call(req).await?.map(Body::new);
            Ok(settings.rewrite(&head, response).await)
        })
    }
}
