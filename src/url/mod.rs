//! URL handling module
//!
//! This module provides task URL validation, domain (netloc) extraction,
//! normalization, and the per-session dedup fingerprint.

mod domain;
mod normalize;

use crate::{UrlError, UrlResult};
use sha2::{Digest, Sha256};
use url::Url;

// Re-export main functions
pub use domain::extract_domain;
pub use normalize::normalize_url;

/// Default limit on the absolute length of a crawlable URL
pub const DEFAULT_MAX_URL_LENGTH: usize = 128;

/// Parses and validates a URL that is about to become a fetch task
///
/// Rejects URLs that fail to parse, use anything other than HTTP(S), have an
/// empty host, or whose absolute form is longer than `max_len`. The returned
/// URL has its fragment removed, since fragments never reach the server.
///
/// # Examples
///
/// ```
/// use ripple_crawl::url::validate_task_url;
///
/// let url = validate_task_url("http://example.com/page#top", 128).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page");
///
/// assert!(validate_task_url("example.com/page", 128).is_err());
/// ```
pub fn validate_task_url(raw: &str, max_len: usize) -> UrlResult<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlError::Parse("empty url".to_string()));
    }

    let mut url = Url::parse(raw).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);

    if url.as_str().len() > max_len {
        return Err(UrlError::TooLong {
            length: url.as_str().len(),
            limit: max_len,
        });
    }

    Ok(url)
}

/// Computes the dedup fingerprint of a URL within one crawl session
///
/// The fingerprint is the hex SHA-256 of `"{correlation}:{normalized-url}"`,
/// so the same page reached through cosmetically different links (fragment,
/// tracking parameters, parameter order, host case) maps to one entry, while
/// separate crawl sessions never collide.
pub fn fingerprint(correlation: &str, url: &Url) -> String {
    let normalized = normalize_url(url.as_str())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string());

    let mut hasher = Sha256::new();
    hasher.update(correlation.as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_http_and_https() {
        assert!(validate_task_url("http://example.com/", 128).is_ok());
        assert!(validate_task_url("https://example.com/a/b?c=d", 128).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_scheme() {
        let result = validate_task_url("example.com/page", 128);
        assert!(matches!(result, Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_other_schemes() {
        let result = validate_task_url("ftp://example.com/file", 128);
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(validate_task_url("   ", 128).is_err());
    }

    #[test]
    fn test_validate_rejects_oversize() {
        let long = format!("http://example.com/{}", "a".repeat(200));
        let result = validate_task_url(&long, 128);
        assert!(matches!(
            result,
            Err(UrlError::TooLong { limit: 128, .. })
        ));
    }

    #[test]
    fn test_validate_length_boundary() {
        let base = "http://example.com/";
        let exact = format!("{}{}", base, "a".repeat(128 - base.len()));
        assert_eq!(exact.len(), 128);
        assert!(validate_task_url(&exact, 128).is_ok());

        let over = format!("{}a", exact);
        assert!(validate_task_url(&over, 128).is_err());
    }

    #[test]
    fn test_validate_strips_fragment() {
        let url = validate_task_url("http://example.com/page#section", 128).unwrap();
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let url = Url::parse("http://example.com/page").unwrap();
        assert_eq!(fingerprint("abc", &url), fingerprint("abc", &url));
        assert_eq!(fingerprint("abc", &url).len(), 64);
    }

    #[test]
    fn test_fingerprint_depends_on_correlation() {
        let url = Url::parse("http://example.com/page").unwrap();
        assert_ne!(fingerprint("session-a", &url), fingerprint("session-b", &url));
    }

    #[test]
    fn test_fingerprint_ignores_cosmetic_differences() {
        let a = Url::parse("http://EXAMPLE.com/page?b=2&a=1#top").unwrap();
        let b = Url::parse("http://example.com/page?a=1&b=2&utm_source=mail").unwrap();
        assert_eq!(fingerprint("s", &a), fingerprint("s", &b));
    }

    #[test]
    fn test_fingerprint_distinguishes_paths() {
        let a = Url::parse("http://example.com/one").unwrap();
        let b = Url::parse("http://example.com/two").unwrap();
        assert_ne!(fingerprint("s", &a), fingerprint("s", &b));
    }
}
