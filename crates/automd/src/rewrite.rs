//! The decision-and-rewrite pipeline
//!
//! Runs once per response, after the wrapped service has finished. Every
//! check that says "no" returns the response untouched; only a successful
//! conversion produces a new response.

use crate::base_url::parse_base_url;
use crate::body::{buffer_body, Buffered};
use crate::config::{ErrorCallback, Settings};
use crate::content_type::{content_type, is_eligible, is_encoded, is_markdown};
use crate::detect::RequestHead;
use crate::error::AutoMarkdownError;
use crate::{MARKER_HEADER, MARKER_VALUE};
use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Response};
use tracing::{debug, warn};

impl Settings {
    /// Convert the response to Markdown if the request and response qualify
    pub(crate) async fn rewrite(
        &self,
        head: &RequestHead,
        response: Response<Body>,
    ) -> Response<Body> {
        let ct = content_type(response.headers());

        if is_markdown(ct) {
            debug!(uri = %head.uri, "Response is already markdown");
            return response;
        }

        match self
            .detector
            .classify(head, self.empty_matcher_policy)
            .await
        {
            Ok(true) => {}
            Ok(false) => return response,
            Err(err) => {
                warn!(
                    uri = %head.uri,
                    error = %err,
                    "Agent detection failed, serving original response"
                );
                notify(&self.on_detect_error, &err);
                return response;
            }
        }

        if !is_eligible(ct, &self.allowed_content_types) {
            debug!(uri = %head.uri, content_type = ?ct, "Content type not eligible for conversion");
            return response;
        }

        if is_encoded(response.headers()) {
            debug!(uri = %head.uri, "Response body is encoded, skipping conversion");
            return response;
        }

        if declared_length(&response).is_some_and(|len| len > self.max_body_bytes as u64) {
            debug!(
                uri = %head.uri,
                limit = self.max_body_bytes,
                "Response body too large to convert"
            );
            return response;
        }

        let (parts, body) = response.into_parts();

        let bytes = match buffer_body(body, self.max_body_bytes).await {
            Buffered::Complete(bytes) => bytes,
            Buffered::TooLarge(body) => {
                debug!(
                    uri = %head.uri,
                    limit = self.max_body_bytes,
                    "Response body too large to convert"
                );
                return Response::from_parts(parts, body);
            }
            Buffered::Failed { body, error } => {
                let err = AutoMarkdownError::ReadBody(error);
                warn!(uri = %head.uri, error = %err, "Failed to read response body");
                notify(&self.on_convert_error, &err);
                return Response::from_parts(parts, body);
            }
        };

        let base_url = parse_base_url(&head.url());
        let converted = {
            let html = String::from_utf8_lossy(&bytes);
            self.converter.run(&html, base_url.as_ref()).await
        };

        let markdown = match converted {
            Ok(markdown) => markdown,
            Err(source) => {
                let err = AutoMarkdownError::Convert(source);
                warn!(
                    uri = %head.uri,
                    error = %err,
                    "Markdown conversion failed, serving original response"
                );
                notify(&self.on_convert_error, &err);
                return Response::from_parts(parts, Body::from(bytes));
            }
        };

        debug!(
            uri = %head.uri,
            from = bytes.len(),
            to = markdown.len(),
            "Converted response to markdown"
        );

        let mut parts = parts;
        parts.headers.insert(CONTENT_TYPE, self.response_content_type.clone());
        parts.headers.insert(
            HeaderName::from_static(MARKER_HEADER),
            HeaderValue::from_static(MARKER_VALUE),
        );
        parts.headers.remove(CONTENT_LENGTH);

        Response::from_parts(parts, Body::from(markdown))
    }
}

fn declared_length(response: &Response<Body>) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

fn notify(callback: &Option<ErrorCallback>, err: &AutoMarkdownError) {
    if let Some(callback) = callback {
        callback(err);
    }
}
