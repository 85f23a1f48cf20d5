//! Response eligibility checks

use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::HeaderMap;

/// Marker that identifies an already-converted response
const MARKDOWN_MARKER: &str = "text/markdown";

/// Read the content type of a response, if present and readable
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

/// Check if the content type is one the middleware may convert
///
/// Membership is a case-insensitive substring test, so `text/html` also
/// admits `text/html; charset=utf-8`.
pub fn is_eligible<S: AsRef<str>>(content_type: Option<&str>, allowed: &[S]) -> bool {
    let ct_lower = match content_type {
        Some(ct) if !ct.is_empty() => ct.to_lowercase(),
        _ => return false,
    };

    allowed
        .iter()
        .any(|ty| ct_lower.contains(&ty.as_ref().to_lowercase()))
}

/// Check if the content type already says Markdown
pub fn is_markdown(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.to_lowercase().contains(MARKDOWN_MARKER))
}

/// Check if the body is compressed or otherwise encoded
pub fn is_encoded(headers: &HeaderMap) -> bool {
    headers.get_all(CONTENT_ENCODING).iter().any(|v| {
        v.to_str()
            .map(|s| !s.trim().eq_ignore_ascii_case("identity") && !s.trim().is_empty())
            .unwrap_or(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_CONTENT_TYPES;
    use axum::http::HeaderValue;

    #[test]
    fn test_is_eligible_defaults() {
        assert!(is_eligible(Some("text/html"), DEFAULT_CONTENT_TYPES));
        assert!(is_eligible(Some("text/html; charset=utf-8"), DEFAULT_CONTENT_TYPES));
        assert!(is_eligible(Some("TEXT/HTML"), DEFAULT_CONTENT_TYPES));
        assert!(is_eligible(Some("application/xhtml+xml"), DEFAULT_CONTENT_TYPES));
        assert!(!is_eligible(Some("text/plain"), DEFAULT_CONTENT_TYPES));
        assert!(!is_eligible(Some("application/json"), DEFAULT_CONTENT_TYPES));
    }

    #[test]
    fn test_is_eligible_missing_content_type() {
        assert!(!is_eligible(None, DEFAULT_CONTENT_TYPES));
        assert!(!is_eligible(Some(""), DEFAULT_CONTENT_TYPES));
    }

    #[test]
    fn test_is_eligible_custom_list() {
        let allowed = vec!["Application/XHTML+XML".to_string()];
        assert!(is_eligible(Some("application/xhtml+xml"), &allowed));
        assert!(!is_eligible(Some("text/html"), &allowed));

        let empty: Vec<String> = Vec::new();
        assert!(!is_eligible(Some("text/html"), &empty));
    }

    #[test]
    fn test_is_markdown() {
        assert!(is_markdown(Some("text/markdown")));
        assert!(is_markdown(Some("text/markdown; charset=utf-8")));
        assert!(is_markdown(Some("Text/Markdown")));
        assert!(!is_markdown(Some("text/html")));
        assert!(!is_markdown(None));
    }

    #[test]
    fn test_is_encoded() {
        let mut headers = HeaderMap::new();
        assert!(!is_encoded(&headers));

        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("identity"));
        assert!(!is_encoded(&headers));

        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        assert!(is_encoded(&headers));
    }
}
