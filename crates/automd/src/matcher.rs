//! Declarative header matching
//!
//! A [`HeaderMatcher`] names one request header and the values that mark the
//! caller as an agent. A list of matchers succeeds as soon as any one of them
//! matches; see [`matches_any`].

use axum::http::HeaderMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One admissible way a request header can identify an agent client
///
/// Rules are evaluated in the order `equals`, `includes`, `matches`, all
/// against the lowercased header value. `equals` and `includes` entries are
/// compared case-insensitively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderMatcher {
    /// Header name (case-insensitive)
    pub header: String,

    /// Exact value match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equals: Vec<String>,

    /// Substring match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,

    /// Regex match against the lowercased value
    #[serde(default, with = "regex_list", skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<Regex>,
}

/// What a matcher without any `equals`/`includes`/`matches` rule means
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyMatcherPolicy {
    /// The header being present is enough
    #[default]
    Presence,
    /// The matcher never matches
    Never,
}

impl HeaderMatcher {
    /// Create a matcher for the given header with no rules yet
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Default::default()
        }
    }

    /// Add an exact value
    pub fn equals(mut self, value: impl Into<String>) -> Self {
        self.equals.push(value.into());
        self
    }

    /// Add a substring
    pub fn includes(mut self, value: impl Into<String>) -> Self {
        self.includes.push(value.into());
        self
    }

    /// Add a pattern
    pub fn matches(mut self, pattern: Regex) -> Self {
        self.matches.push(pattern);
        self
    }

    /// True if no rule is declared
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.includes.is_empty() && self.matches.is_empty()
    }

    /// Check a single (already lowercased) header value against the rules
    fn matches_value(&self, lowered: &str, policy: EmptyMatcherPolicy) -> bool {
        if self.is_empty() {
            return policy == EmptyMatcherPolicy::Presence;
        }

        if self
            .equals
            .iter()
            .any(|item| lowered == item.to_lowercase())
        {
            return true;
        }

        if self
            .includes
            .iter()
            .any(|item| lowered.contains(&item.to_lowercase()))
        {
            return true;
        }

        self.matches.iter().any(|regex| regex.is_match(lowered))
    }

    /// Check this matcher against a request's headers
    ///
    /// Absent or empty headers never match. Every value of a repeated header
    /// is tried.
    pub fn is_match(&self, headers: &HeaderMap, policy: EmptyMatcherPolicy) -> bool {
        let name = self.header.to_lowercase();
        headers.get_all(name.as_str()).iter().any(|value| {
            let lowered = String::from_utf8_lossy(value.as_bytes()).to_lowercase();
            !lowered.is_empty() && self.matches_value(&lowered, policy)
        })
    }
}

/// Returns true if any matcher in the list matches the headers
pub fn matches_any(
    headers: &HeaderMap,
    matchers: &[HeaderMatcher],
    policy: EmptyMatcherPolicy,
) -> bool {
    matchers.iter().any(|matcher| {
        let matched = matcher.is_match(headers, policy);
        if matched {
            tracing::trace!(header = %matcher.header, "Header matcher hit");
        }
        matched
    })
}

/// User-Agent fragments of well-known AI crawlers and assistants
const AGENT_USER_AGENTS: &[&str] = &[
    "chatgpt",
    "gptbot",
    "oai-searchbot",
    "claude-user",
    "claudebot",
    "claude-web",
    "anthropic-ai",
    "perplexitybot",
    "perplexity-user",
    "google-extended",
    "ccbot",
    "cohere-ai",
    "bytespider",
    "amazonbot",
    "applebot-extended",
    "meta-externalagent",
    "mistralai-user",
    "duckassistbot",
    "youbot",
];

/// Built-in agent signals
///
/// Returned fresh on every call so callers can extend the list instead of
/// replacing it.
pub fn default_agent_matchers() -> Vec<HeaderMatcher> {
    let mut user_agent = HeaderMatcher::new("user-agent");
    user_agent.includes = AGENT_USER_AGENTS.iter().map(|s| s.to_string()).collect();

    vec![
        user_agent,
        // HTTP message signatures for bots; presence alone is the signal
        HeaderMatcher::new("signature-agent"),
        HeaderMatcher::new("accept").includes("text/markdown"),
    ]
}

mod regex_list {
    use regex::Regex;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(patterns: &[Regex], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(patterns.iter().map(Regex::as_str))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Regex>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let patterns = Vec::<String>::deserialize(deserializer)?;
        patterns
            .iter()
            .map(|p| Regex::new(p).map_err(serde::de::Error::custom))
            .collect()
    }
}
