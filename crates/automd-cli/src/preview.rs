//! Preview what an agent receives from a live URL

use automd::{html_to_markdown_with, is_eligible, is_markdown, AutoMarkdownConfig};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default User-Agent, recognized by the built-in matchers
pub const DEFAULT_AGENT_USER_AGENT: &str = "Claude-User (automd)";

/// Accept header sent with previews
const ACCEPT_MARKDOWN: &str = "text/markdown, text/html;q=0.9, */*;q=0.8";

/// Total request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while fetching a preview
#[derive(Debug, Error)]
pub enum PreviewError {
    /// URL has invalid scheme
    #[error("Invalid URL: must start with http:// or https://")]
    InvalidUrlScheme,

    /// User-Agent cannot be sent as a header
    #[error("Invalid User-Agent header value")]
    InvalidUserAgent,

    /// Request failed
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// What an agent would receive
#[derive(Debug, Clone, Default, Serialize)]
pub struct Preview {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status code
    pub status_code: u16,
    /// Content-Type of the upstream response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// True if the body was converted locally
    pub converted: bool,
    /// Markdown (or verbatim) body
    pub content: String,
}

/// Fetch a URL as an agent and convert the body the way the middleware would
pub async fn fetch_preview(
    url: &str,
    user_agent: &str,
    config: &AutoMarkdownConfig,
) -> Result<Preview, PreviewError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(PreviewError::InvalidUrlScheme);
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent).map_err(|_| PreviewError::InvalidUserAgent)?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_MARKDOWN));

    let client = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let response = client.get(url).send().await?;

    let final_url = response.url().clone();
    let status_code = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let body = response.text().await?;

    let (converted, content) = if is_markdown(content_type.as_deref()) {
        debug!(url = %final_url, "Upstream already served markdown");
        (false, body)
    } else if is_eligible(content_type.as_deref(), &config.allowed_content_types) {
        let markdown = html_to_markdown_with(&body, Some(&final_url), &config.html_to_markdown);
        (true, markdown)
    } else {
        debug!(
            url = %final_url,
            content_type = ?content_type,
            "Content type not eligible for conversion"
        );
        (false, body)
    };

    Ok(Preview {
        url: final_url.to_string(),
        status_code,
        content_type,
        converted,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_preview_converts_html() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/guide/"))
            .and(header("user-agent", DEFAULT_AGENT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"<html><body><h1>Guide</h1><a href="intro">Intro</a></body></html>"#,
                "text/html",
            ))
            .mount(&mock_server)
            .await;

        let url = format!("{}/guide/", mock_server.uri());
        let preview = fetch_preview(&url, DEFAULT_AGENT_USER_AGENT, &AutoMarkdownConfig::default())
            .await
            .unwrap();

        assert_eq!(preview.status_code, 200);
        assert!(preview.converted);
        assert!(preview.content.contains("# Guide"));
        assert!(preview
            .content
            .contains(&format!("[Intro]({}/guide/intro)", mock_server.uri())));
    }

    #[tokio::test]
    async fn test_preview_keeps_markdown() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("# Served as markdown", "text/markdown"),
            )
            .mount(&mock_server)
            .await;

        let preview = fetch_preview(
            &format!("{}/", mock_server.uri()),
            DEFAULT_AGENT_USER_AGENT,
            &AutoMarkdownConfig::default(),
        )
        .await
        .unwrap();

        assert!(!preview.converted);
        assert_eq!(preview.content, "# Served as markdown");
    }

    #[tokio::test]
    async fn test_preview_keeps_ineligible_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"ok":true}"#, "application/json"),
            )
            .mount(&mock_server)
            .await;

        let preview = fetch_preview(
            &format!("{}/data.json", mock_server.uri()),
            DEFAULT_AGENT_USER_AGENT,
            &AutoMarkdownConfig::default(),
        )
        .await
        .unwrap();

        assert!(!preview.converted);
        assert_eq!(preview.content_type, Some("application/json".to_string()));
        assert_eq!(preview.content, r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_preview_invalid_scheme() {
        let result = fetch_preview(
            "ftp://example.com",
            DEFAULT_AGENT_USER_AGENT,
            &AutoMarkdownConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(PreviewError::InvalidUrlScheme)));
    }

    #[tokio::test]
    async fn test_preview_invalid_user_agent() {
        let result = fetch_preview(
            "https://example.com",
            "bad\nagent",
            &AutoMarkdownConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(PreviewError::InvalidUserAgent)));
    }
}
