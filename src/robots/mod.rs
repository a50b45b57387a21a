//! Robots.txt handling module
//!
//! Fetches and evaluates robots.txt. Caching is done by the domain lock
//! manager, which stores the parsed rules in the shared domain state.

mod parser;

pub use parser::ParsedRobots;

use crate::CrawlError;
use reqwest::{Client, StatusCode};

/// Builds the robots.txt URL for a domain
pub fn robots_url(scheme: &str, domain: &str) -> String {
    format!("{}://{}/robots.txt", scheme, domain)
}

/// Fetches robots.txt for a domain
///
/// | Response | Result |
/// |----------|--------|
/// | 2xx | rules from the body |
/// | 401, 403 | everything disallowed |
/// | other status | everything allowed |
/// | transport error | `FetchFailed` |
pub async fn fetch_robots(
    client: &Client,
    scheme: &str,
    domain: &str,
) -> Result<ParsedRobots, CrawlError> {
    let url = robots_url(scheme, domain);
    tracing::debug!("Fetching {}", url);

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| CrawlError::FetchFailed {
            url: url.clone(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        tracing::info!("{} answered {}, treating domain as disallowed", url, status);
        return Ok(ParsedRobots::disallow_all());
    }

    if !status.is_success() {
        tracing::debug!("{} answered {}, allowing all", url, status);
        return Ok(ParsedRobots::allow_all());
    }

    let body = response.text().await.map_err(|e| CrawlError::FetchFailed {
        url: url.clone(),
        message: e.to_string(),
    })?;

    Ok(ParsedRobots::from_content(&body))
}
