//! HTTP fetcher
//!
//! This module handles the page GET for spider workers:
//! - Building the shared HTTP client with the identifying user agent
//! - Timing each request
//! - Classifying responses for the caller

use crate::config::Config;
use crate::CrawlError;
use reqwest::Client;
use std::time::{Duration, Instant};

/// Upper bound on TCP/TLS connection setup
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A completed HTTP exchange, whatever its status
#[derive(Debug)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,
    /// HTTP status code
    pub status: u16,
    /// Content-Type header value, empty if absent
    pub content_type: String,
    /// Raw response body
    pub body: Vec<u8>,
    /// Wall-clock seconds from request start to end of body
    pub elapsed: f64,
}

impl FetchedPage {
    /// 2xx and 3xx count as a successful fetch
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// Below 500 the server answered for this URL, so the URL is claimed
    pub fn is_claimable(&self) -> bool {
        self.status < 500
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use ripple_crawl::config::Config;
/// use ripple_crawl::crawler::build_http_client;
///
/// let client = build_http_client(&Config::default()).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version or CrawlerName/Version (+ContactURL)
    let user_agent = config.user_agent.header();
    let timeout = config.crawler.request_timeout();

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs a GET request and reads the body, up to `max_body_bytes`
///
/// Any HTTP status is returned as a `FetchedPage`; the caller decides what
/// counts as success. Transport failures (DNS, refused connection, timeout,
/// broken body) and oversized bodies become `FetchFailed`.
pub async fn fetch_page(
    client: &Client,
    url: &str,
    max_body_bytes: usize,
) -> Result<FetchedPage, CrawlError> {
    let started = Instant::now();

    let mut response = client.get(url).send().await.map_err(|e| CrawlError::FetchFailed {
        url: url.to_string(),
        message: describe_transport_error(&e),
    })?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if let Some(length) = response.content_length() {
        if length > max_body_bytes as u64 {
            return Err(body_too_large(url, max_body_bytes));
        }
    }

    // Content-Length may be absent or wrong, so the cap is enforced per chunk
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| CrawlError::FetchFailed {
        url: url.to_string(),
        message: describe_transport_error(&e),
    })? {
        if body.len() + chunk.len() > max_body_bytes {
            return Err(body_too_large(url, max_body_bytes));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(FetchedPage {
        final_url,
        status,
        content_type,
        body,
        elapsed: started.elapsed().as_secs_f64(),
    })
}

fn body_too_large(url: &str, limit: usize) -> CrawlError {
    CrawlError::FetchFailed {
        url: url.to_string(),
        message: format!("Body exceeds {} bytes", limit),
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    }
}
