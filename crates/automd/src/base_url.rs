//! Base URL resolution for relative links and images

use url::Url;

/// Normalize a URL string into an absolute base URL
///
/// Returns `None` for anything that does not parse as an absolute URL,
/// including relative paths.
pub fn resolve_base_url(maybe_url: &str) -> Option<String> {
    parse_base_url(maybe_url).map(String::from)
}

pub(crate) fn parse_base_url(maybe_url: &str) -> Option<Url> {
    Url::parse(maybe_url).ok()
}
