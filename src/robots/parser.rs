//! Robots.txt parser implementation
//!
//! Fetch permission is delegated to the robotstxt crate; crawl-delay is read
//! from the group that matches the crawler's user agent.

use robotstxt::DefaultMatcher;
use serde::{Deserialize, Serialize};

/// How a robots.txt decision is made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum Mode {
    /// No usable robots.txt: everything is allowed
    AllowAll,
    /// Access to robots.txt was refused: nothing is allowed
    DisallowAll,
    /// Rules come from the stored content
    Rules,
}

/// Parsed robots.txt data
///
/// Only the raw content is kept, so a `ParsedRobots` can be cached in the
/// shared state store and evaluated by any worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRobots {
    mode: Mode,
    content: String,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            mode: Mode::Rules,
            content: content.to_string(),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when robots.txt is missing or the server errors.
    pub fn allow_all() -> Self {
        Self {
            mode: Mode::AllowAll,
            content: String::new(),
        }
    }

    /// Creates a ParsedRobots that denies everything
    ///
    /// Used when the server answers robots.txt with 401 or 403.
    pub fn disallow_all() -> Self {
        Self {
            mode: Mode::DisallowAll,
            content: String::new(),
        }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL (or bare path) to check
    /// * `user_agent` - The user agent product token
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match self.mode {
            Mode::AllowAll => true,
            Mode::DisallowAll => false,
            Mode::Rules if self.content.trim().is_empty() => true,
            Mode::Rules => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
            }
        }
    }

    /// Gets the crawl delay in seconds for a specific user agent
    ///
    /// A group naming the agent wins over the `*` group. Returns `None` if
    /// neither declares a delay.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.mode != Mode::Rules {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut for_agent = None;
        let mut for_wildcard = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // a user-agent after rules opens a new group
                    if in_rules {
                        group.clear();
                        in_rules = false;
                    }
                    group.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    // "inf", "NaN" and overflowing values parse but mean nothing
                    if !delay.is_finite() || delay < 0.0 {
                        continue;
                    }
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        for_agent.get_or_insert(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        for_wildcard.get_or_insert(delay);
                    }
                }
                _ => in_rules = true,
            }
        }

        for_agent.or(for_wildcard)
    }
}
