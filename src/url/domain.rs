use url::Url;

/// Extracts the domain key from a URL
///
/// The domain key is the lowercase host plus an explicit port, if the URL
/// carries a non-default one. Two servers on the same host but different
/// ports are different sites as far as politeness is concerned.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use ripple_crawl::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.com/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(extract_domain(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    if host.is_empty() {
        return None;
    }

    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}
