//! HTML to Markdown conversion
//!
//! The built-in converter is a single pass over the markup: tags are read one
//! at a time and translated to Markdown syntax, text is entity-decoded and
//! copied through. There is no DOM, so malformed markup degrades to its text.

use crate::error::BoxError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use url::Url;

/// Space that survives whitespace collapsing (list indentation, preformatted text)
const HARD_SPACE: char = '\u{1}';

/// Elements whose content never reaches the output
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "template", "head",
];

/// Options for the built-in converter
///
/// The base URL is deliberately not an option: the middleware always derives
/// it from the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlToMarkdownOptions {
    /// Render links as their text only
    pub link_as_text: bool,
    /// Drop images
    pub hide_images: bool,
}

impl HtmlToMarkdownOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Render links as their text only
    pub fn link_as_text(mut self, enable: bool) -> Self {
        self.link_as_text = enable;
        self
    }

    /// Drop images
    pub fn hide_images(mut self, enable: bool) -> Self {
        self.hide_images = enable;
        self
    }
}

/// Trait for custom converters
///
/// A custom converter receives the raw response text and its output becomes
/// the response body verbatim.
#[async_trait]
pub trait Convert: Send + Sync {
    /// Convert the response body to Markdown
    async fn convert(&self, html: &str) -> Result<String, BoxError>;
}

struct FnConvert<F>(F);

#[async_trait]
impl<F> Convert for FnConvert<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    async fn convert(&self, html: &str) -> Result<String, BoxError> {
        Ok((self.0)(html))
    }
}

struct AsyncFnConvert<F>(F);

#[async_trait]
impl<F, Fut, E> Convert for AsyncFnConvert<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn convert(&self, html: &str) -> Result<String, BoxError> {
        (self.0)(html.to_string()).await.map_err(Into::into)
    }
}

/// How response bodies are turned into Markdown
#[derive(Clone)]
pub enum Converter {
    /// Built-in converter with options; the base URL is injected per request
    Builtin(HtmlToMarkdownOptions),
    /// Full override; no base URL is injected
    Custom(Arc<dyn Convert>),
}

impl Default for Converter {
    fn default() -> Self {
        Converter::Builtin(HtmlToMarkdownOptions::default())
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Converter::Builtin(options) => f.debug_tuple("Builtin").field(options).finish(),
            Converter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<HtmlToMarkdownOptions> for Converter {
    fn from(options: HtmlToMarkdownOptions) -> Self {
        Converter::Builtin(options)
    }
}

impl Converter {
    /// Use a synchronous conversion function
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Converter::Custom(Arc::new(FnConvert(f)))
    }

    /// Use an asynchronous, fallible conversion function
    pub fn from_async_fn<F, Fut, E>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Converter::Custom(Arc::new(AsyncFnConvert(f)))
    }

    /// Use a custom [`Convert`] implementation
    pub fn custom(convert: impl Convert + 'static) -> Self {
        Converter::Custom(Arc::new(convert))
    }

    /// Run the conversion
    ///
    /// `base_url` only applies to the built-in converter.
    pub async fn run(&self, html: &str, base_url: Option<&Url>) -> Result<String, BoxError> {
        match self {
            Converter::Builtin(options) => Ok(html_to_markdown_with(html, base_url, options)),
            Converter::Custom(convert) => convert.convert(html).await,
        }
    }
}

/// Convert HTML to markdown with default options and no base URL
pub fn html_to_markdown(html: &str) -> String {
    html_to_markdown_with(html, None, &HtmlToMarkdownOptions::default())
}

/// Table being collected; cells are flushed as GFM rows
#[derive(Default)]
struct TableState {
    rows: usize,
    cells: Vec<String>,
    columns: usize,
    cell_start: Option<usize>,
}

/// Convert HTML to markdown
///
/// Relative link and image targets are resolved against `base_url` when one
/// is given.
pub fn html_to_markdown_with(
    html: &str,
    base_url: Option<&Url>,
    options: &HtmlToMarkdownOptions,
) -> String {
    let mut output = String::new();
    let mut skip_elements: Vec<String> = Vec::new();
    let mut list_depth: usize = 0;
    let mut in_pre = false;
    let mut in_blockquote = false;
    // Link targets of currently open <a> elements; None for links rendered as text
    let mut links: Vec<Option<String>> = Vec::new();
    let mut table: Option<TableState> = None;

    let mut chars = html.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '<' {
            let mut tag = String::new();
            // A '>' inside a quoted attribute value does not end the tag
            let mut quote: Option<char> = None;
            while let Some(&next) = chars.peek() {
                chars.next();
                match quote {
                    Some(q) if next == q => quote = None,
                    Some(_) => {}
                    None if next == '>' => break,
                    None if (next == '"' || next == '\'') && tag.trim_end().ends_with('=') => {
                        quote = Some(next);
                    }
                    None => {}
                }
                tag.push(next);
            }

            // Comments and doctypes
            if tag.starts_with('!') || tag.starts_with('?') {
                continue;
            }

            let tag_lower = tag.to_lowercase();
            let is_closing = tag_lower.starts_with('/');
            let tag_name = tag_lower
                .trim_start_matches('/')
                .split(|c: char| c.is_whitespace() || c == '/')
                .next()
                .unwrap_or("")
                .to_string();

            if SKIP_TAGS.contains(&tag_name.as_str()) {
                if is_closing {
                    if let Some(pos) = skip_elements.iter().rposition(|t| *t == tag_name) {
                        skip_elements.remove(pos);
                    }
                } else if !tag.ends_with('/') {
                    skip_elements.push(tag_name);
                }
                continue;
            }

            if !skip_elements.is_empty() {
                continue;
            }

            match tag_name.as_str() {
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    if !is_closing {
                        let level = usize::from(tag_name.as_bytes()[1] - b'0');
                        output.push('\n');
                        output.push_str(&"#".repeat(level));
                        output.push(' ');
                    } else {
                        output.push_str("\n\n");
                    }
                }
                "p" | "div" | "section" | "article" | "main" | "header" | "footer" | "nav"
                | "aside" => {
                    if is_closing {
                        output.push_str("\n\n");
                    }
                }
                "br" => {
                    output.push('\n');
                }
                "hr" => {
                    output.push_str("\n---\n");
                }
                "ul" | "ol" => {
                    if is_closing {
                        list_depth = list_depth.saturating_sub(1);
                        if list_depth == 0 {
                            output.push('\n');
                        }
                    } else {
                        list_depth += 1;
                    }
                }
                "li" => {
                    if !is_closing {
                        output.push('\n');
                        for _ in 0..list_depth.saturating_sub(1) {
                            output.push(HARD_SPACE);
                            output.push(HARD_SPACE);
                        }
                        output.push_str("- ");
                    }
                }
                "strong" | "b" => {
                    output.push_str("**");
                }
                "em" | "i" => {
                    output.push('*');
                }
                "pre" => {
                    output.push_str("\n```\n");
                    in_pre = !is_closing;
                }
                "code" => {
                    if !in_pre {
                        output.push('`');
                    }
                }
                "blockquote" => {
                    if !is_closing {
                        in_blockquote = true;
                        output.push_str("\n> ");
                    } else {
                        in_blockquote = false;
                        output.push('\n');
                    }
                }
                "a" => {
                    if !is_closing {
                        let href = extract_attribute(&tag, "href")
                            .filter(|_| !options.link_as_text)
                            .filter(|h| !h.is_empty());
                        if href.is_some() {
                            output.push('[');
                        }
                        links.push(href.map(|h| resolve_target(&h, base_url)));
                    } else if let Some(Some(href)) = links.pop() {
                        output.push_str("](");
                        output.push_str(&href);
                        output.push(')');
                    }
                }
                "img" => {
                    if !options.hide_images {
                        let src = extract_attribute(&tag, "src").filter(|s| !s.is_empty());
                        if let Some(src) = src {
                            let alt = extract_attribute(&tag, "alt").unwrap_or_default();
                            output.push_str("![");
                            output.push_str(&alt);
                            output.push_str("](");
                            output.push_str(&resolve_target(&src, base_url));
                            output.push(')');
                        }
                    }
                }
                "table" => {
                    if !is_closing {
                        output.push_str("\n\n");
                        table = Some(TableState::default());
                    } else {
                        table = None;
                        output.push('\n');
                    }
                }
                "tr" => {
                    if let Some(state) = table.as_mut() {
                        if !is_closing {
                            state.cells.clear();
                        } else {
                            flush_row(&mut output, state);
                        }
                    }
                }
                "td" | "th" => {
                    if let Some(state) = table.as_mut() {
                        if !is_closing {
                            state.cell_start = Some(output.len());
                        } else if let Some(start) = state.cell_start.take() {
                            let cell = output.split_off(start);
                            state.cells.push(clean_cell(&cell));
                        }
                    }
                }
                _ => {}
            }
        } else if skip_elements.is_empty() {
            let decoded = decode_entity(c, &mut chars);
            if in_blockquote && decoded == '\n' {
                output.push_str("\n> ");
            } else if in_pre && (decoded == ' ' || decoded == '\t') {
                output.push(HARD_SPACE);
            } else {
                output.push(decoded);
            }
        }
    }

    clean_whitespace(&output)
}

/// Emit one table row; the first row is treated as the header
fn flush_row(output: &mut String, state: &mut TableState) {
    if state.cells.is_empty() {
        return;
    }
    if state.rows == 0 {
        state.columns = state.cells.len();
    }
    while state.cells.len() < state.columns {
        state.cells.push(String::new());
    }

    output.push_str("| ");
    output.push_str(&state.cells.join(" | "));
    output.push_str(" |\n");

    if state.rows == 0 {
        output.push('|');
        for _ in 0..state.columns {
            output.push_str(" --- |");
        }
        output.push('\n');
    }

    state.rows += 1;
    state.cells.clear();
}

/// Collapse a cell to a single line that cannot break the row
fn clean_cell(cell: &str) -> String {
    cell.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

/// Resolve a link or image target against the base URL
fn resolve_target(target: &str, base_url: Option<&Url>) -> String {
    match base_url {
        Some(base) => base
            .join(target)
            .map(String::from)
            .unwrap_or_else(|_| target.to_string()),
        None => target.to_string(),
    }
}

/// Extract attribute value from tag
fn extract_attribute(tag: &str, attr: &str) -> Option<String> {
    // ASCII-only lowercasing keeps byte offsets valid in `tag`
    let tag_lower = tag.to_ascii_lowercase();
    let pattern = format!("{}=", attr);

    // Require a boundary before the name so `data-src` does not match `src`
    let mut offset = 0;
    let start = loop {
        let pos = offset + tag_lower[offset..].find(&pattern)?;
        let boundary = tag_lower[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace());
        if boundary {
            break pos;
        }
        offset = pos + pattern.len();
    };

    let rest = tag[start + pattern.len()..].trim_start();

    let value = if let Some(rest) = rest.strip_prefix('"') {
        &rest[..rest.find('"')?]
    } else if let Some(rest) = rest.strip_prefix('\'') {
        &rest[..rest.find('\'')?]
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '>')
            .unwrap_or(rest.len());
        rest[..end].trim_end_matches('/')
    };

    Some(decode_entities(value))
}

/// Decode all entities in an attribute value
fn decode_entities(s: &str) -> String {
    let mut chars = s.chars().peekable();
    let mut out = String::with_capacity(s.len());
    while let Some(c) = chars.next() {
        out.push(decode_entity(c, &mut chars));
    }
    out
}

/// Decode HTML entity starting from ampersand
fn decode_entity(c: char, chars: &mut std::iter::Peekable<std::str::Chars>) -> char {
    if c != '&' {
        return c;
    }

    // Look ahead on a copy so an invalid entity leaves the input untouched
    let mut lookahead = chars.clone();
    let mut entity = String::new();
    loop {
        match lookahead.next() {
            Some(';') => break,
            Some(next) if !next.is_whitespace() && next != '&' && entity.len() <= 10 => {
                entity.push(next)
            }
            _ => return '&',
        }
    }

    let decoded = match entity.as_str() {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        "mdash" => Some('—'),
        "ndash" => Some('–'),
        "hellip" => Some('…'),
        "copy" => Some('©'),
        "reg" => Some('®'),
        _ => entity.strip_prefix('#').and_then(|num| {
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
        }),
    };

    match decoded {
        Some(ch) => {
            *chars = lookahead;
            ch
        }
        None => '&',
    }
}

/// Clean whitespace: collapse runs, trim, keep max 2 newlines
pub fn clean_whitespace(s: &str) -> String {
    let mut result = String::new();
    let mut last_was_space = false;
    let mut newline_count = 0;

    for c in s.chars() {
        if c == '\n' {
            if last_was_space && result.ends_with(' ') {
                result.pop();
            }
            newline_count += 1;
            last_was_space = true;
            if newline_count <= 2 {
                result.push(c);
            }
        } else if c == HARD_SPACE {
            newline_count = 0;
            last_was_space = false;
            result.push(' ');
        } else if c.is_whitespace() {
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
        } else {
            newline_count = 0;
            last_was_space = false;
            result.push(c);
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_markdown_headers() {
        let html = "<h1>Title</h1><h2>Subtitle</h2><h6>Small</h6>";
        let md = html_to_markdown(html);
        assert!(md.contains("# Title"));
        assert!(md.contains("## Subtitle"));
        assert!(md.contains("###### Small"));
    }

    #[test]
    fn test_html_to_markdown_page() {
        let html = r#"
  <main>
    <h1>Hello!</h1>
    <p>This page will be converted to Markdown for AI agents.</p>
  </main>
"#;
        let md = html_to_markdown(html);
        assert_eq!(
            md,
            "# Hello!\n\nThis page will be converted to Markdown for AI agents."
        );
    }

    #[test]
    fn test_html_to_markdown_lists() {
        let html = "<ul><li>Item 1</li><li>Item 2<ul><li>Nested</li></ul></li></ul>";
        let md = html_to_markdown(html);
        assert!(md.contains("- Item 1"));
        assert!(md.contains("- Item 2"));
        assert!(md.contains("  - Nested"));
    }

    #[test]
    fn test_html_to_markdown_emphasis() {
        let html = "<p><strong>bold</strong> and <em>italic</em></p>";
        let md = html_to_markdown(html);
        assert!(md.contains("**bold**"));
        assert!(md.contains("*italic*"));
    }

    #[test]
    fn test_html_to_markdown_code() {
        let md = html_to_markdown("<pre>code block</pre><p>use <code>cargo</code></p>");
        assert!(md.contains("```\ncode block\n```"));
        assert!(md.contains("`cargo`"));
    }

    #[test]
    fn test_html_to_markdown_skip_elements() {
        let html = "<html><head><title>T</title><style>p{}</style></head>\
                    <body><p>Before</p><script>alert('bad');</script><p>After</p></body></html>";
        let md = html_to_markdown(html);
        assert!(md.contains("Before"));
        assert!(md.contains("After"));
        assert!(!md.contains("alert"));
        assert!(!md.contains("p{}"));
    }

    #[test]
    fn test_html_to_markdown_links() {
        let md = html_to_markdown(r#"<p>See <a href="https://example.com/docs">the docs</a>.</p>"#);
        assert_eq!(md, "See [the docs](https://example.com/docs).");
    }

    #[test]
    fn test_html_to_markdown_anchor_without_href() {
        let md = html_to_markdown(r#"<a name="top">Top</a>"#);
        assert_eq!(md, "Top");
    }

    #[test]
    fn test_html_to_markdown_resolves_relative_targets() {
        let base = Url::parse("https://example.com/guide/intro").unwrap();
        let html = concat!(
            r#"<a href="/docs">Docs</a> <a href="next">Next</a> "#,
            r#"<img src="img/logo.png" alt="Logo">"#
        );
        let md = html_to_markdown_with(html, Some(&base), &HtmlToMarkdownOptions::default());
        assert!(md.contains("[Docs](https://example.com/docs)"));
        assert!(md.contains("[Next](https://example.com/guide/next)"));
        assert!(md.contains("![Logo](https://example.com/guide/img/logo.png)"));
    }

    #[test]
    fn test_html_to_markdown_without_base_keeps_relative() {
        let md = html_to_markdown(r#"<a href="/docs">Docs</a>"#);
        assert_eq!(md, "[Docs](/docs)");
    }

    #[test]
    fn test_html_to_markdown_link_after_non_ascii_attribute() {
        let md = html_to_markdown(r#"<a title="İİİİ" href=x>link</a>"#);
        assert_eq!(md, "[link](x)");

        let md = html_to_markdown(r#"<a title="İstanbul" href="/x">Go</a>"#);
        assert_eq!(md, "[Go](/x)");
    }

    #[test]
    fn test_html_to_markdown_quoted_angle_bracket() {
        let md = html_to_markdown(r#"<p><a title="a>b" href="/x">Go</a></p>"#);
        assert_eq!(md, "[Go](/x)");

        let md = html_to_markdown(r#"<img alt='1 > 0' src="t.png">"#);
        assert_eq!(md, "![1 > 0](t.png)");
    }

    #[test]
    fn test_html_to_markdown_link_as_text() {
        let options = HtmlToMarkdownOptions::new().link_as_text(true);
        let md = html_to_markdown_with(r#"<a href="/docs">Docs</a>"#, None, &options);
        assert_eq!(md, "Docs");
    }

    #[test]
    fn test_html_to_markdown_hide_images() {
        let html = r#"<p>A <img src="a.png" alt="pic"/> B</p>"#;
        assert!(html_to_markdown(html).contains("![pic](a.png)"));

        let options = HtmlToMarkdownOptions::new().hide_images(true);
        let md = html_to_markdown_with(html, None, &options);
        assert_eq!(md, "A B");
    }

    #[test]
    fn test_html_to_markdown_table() {
        let html = "<table><tr><th>Name</th><th>Age</th></tr>\
                    <tr><td>Ada</td><td>36</td></tr>\
                    <tr><td>A|B</td></tr></table>";
        let md = html_to_markdown(html);
        assert!(md.contains("| Name | Age |\n| --- | --- |\n| Ada | 36 |\n| A\\|B | |"));
    }

    #[test]
    fn test_html_to_markdown_comments_and_doctype() {
        let md = html_to_markdown("<!DOCTYPE html><!-- hidden --><p>Shown</p>");
        assert_eq!(md, "Shown");
    }

    #[test]
    fn test_entity_decoding() {
        let html = "<p>&amp; &lt; &gt; &quot; &apos; &#39; &#x41; &mdash; &copy;</p>";
        let md = html_to_markdown(html);
        assert_eq!(md, "& < > \" ' ' A — ©");
    }

    #[test]
    fn test_invalid_entity_is_kept() {
        let md = html_to_markdown("<p>Fish &chips; R&D &amp more</p>");
        assert_eq!(md, "Fish &chips; R&D &amp more");
    }

    #[test]
    fn test_clean_whitespace() {
        let input = "  hello   world  \n\n\n\n  test  ";
        let output = clean_whitespace(input);
        assert_eq!(output, "hello world\n\ntest");
    }

    #[test]
    fn test_extract_attribute() {
        assert_eq!(
            extract_attribute("a href=\"https://example.com\" class=\"link\"", "href"),
            Some("https://example.com".to_string())
        );
        assert_eq!(
            extract_attribute("img src='image.png'", "src"),
            Some("image.png".to_string())
        );
        assert_eq!(
            extract_attribute("div class=test", "class"),
            Some("test".to_string())
        );
        assert_eq!(
            extract_attribute("img data-src=\"lazy.png\" src=\"real.png\"", "src"),
            Some("real.png".to_string())
        );
        assert_eq!(
            extract_attribute("a href=\"/?a=1&amp;b=2\"", "href"),
            Some("/?a=1&b=2".to_string())
        );
        assert_eq!(
            extract_attribute("a title=\"İİİİ\" HREF=\"/x\"", "href"),
            Some("/x".to_string())
        );
        assert_eq!(extract_attribute("img alt=\"x\"", "src"), None);
    }

    #[tokio::test]
    async fn test_converter_builtin_uses_base_url() {
        let base = Url::parse("https://example.com/").unwrap();
        let md = Converter::default()
            .run(r#"<a href="a">A</a>"#, Some(&base))
            .await
            .unwrap();
        assert_eq!(md, "[A](https://example.com/a)");
    }

    #[tokio::test]
    async fn test_converter_custom_ignores_base_url() {
        let converter = Converter::from_fn(|html| format!("len={}", html.len()));
        let base = Url::parse("https://example.com/").unwrap();
        let md = converter.run("<p>x</p>", Some(&base)).await.unwrap();
        assert_eq!(md, "len=8");
    }

    #[tokio::test]
    async fn test_converter_async_error() {
        let converter = Converter::from_async_fn(|_html: String| async move {
            Err::<String, _>(std::io::Error::other("upstream converter down"))
        });
        let err = converter.run("<p>x</p>", None).await.unwrap_err();
        assert_eq!(err.to_string(), "upstream converter down");
    }
}
