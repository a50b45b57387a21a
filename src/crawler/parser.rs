//! HTML parser for scanner workers
//!
//! Extracts from a fetched page:
//! - The title
//! - Hyperlinks with their anchor text, resolved to absolute URLs
//! - A short run of paragraph text

use crate::task::LinkSummary;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Most paragraphs kept per page
pub const MAX_PARAGRAPHS: usize = 11;

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Followable links in document order (absolute URLs)
    pub links: Vec<LinkSummary>,

    /// Text of the first few non-empty paragraphs
    pub paragraphs: Vec<String>,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:** every `<a href="...">`, nofollow included
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs and fragment-only anchors
/// - Anything that is not HTTP(S) after resolution
///
/// Malformed markup never fails: the HTML5 parser recovers and yields
/// whatever structure it can.
///
/// # Example
///
/// ```
/// use ripple_crawl::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].href, "https://example.com/page");
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, base_url),
        paragraphs: extract_paragraphs(&document),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(collapse_text)
        .filter(|s| !s.is_empty())
}

/// Extracts all followable links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<LinkSummary> {
    let Ok(a_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&a_selector)
        .filter(|element| element.value().attr("download").is_none())
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            let absolute = resolve_link(href, base_url)?;
            Some(LinkSummary {
                href: absolute,
                text: collapse_text(element),
            })
        })
        .collect()
}

/// Extracts up to `MAX_PARAGRAPHS` non-empty paragraph texts
fn extract_paragraphs(document: &Html) -> Vec<String> {
    let Ok(p_selector) = Selector::parse("p") else {
        return Vec::new();
    };

    document
        .select(&p_selector)
        .map(collapse_text)
        .filter(|text| !text.is_empty())
        .take(MAX_PARAGRAPHS)
        .collect()
}

/// Joins an element's text nodes with single spaces
fn collapse_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url.to_string()),
        _ => None,
    }
}
