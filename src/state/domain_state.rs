use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Politeness policy and lock record shared by every spider for one domain
///
/// Lives in the shared state store keyed by `domain`. The robots decision and
/// crawl delay are authoritative until `expires_at`; after that the entry is
/// treated as absent and robots.txt is fetched again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainState {
    /// Domain key (host plus non-default port)
    pub domain: String,

    /// Robots outcome for the path that created this entry
    pub valid: bool,

    /// Exclusive-fetch flag
    pub lock: bool,

    /// Lease token of the current lock holder
    pub holder: Option<String>,

    /// Seconds to hold the lock after each fetch
    pub crawl_delay: f64,

    /// Number of fetches serviced under this policy, starting at 1
    pub depth: u32,

    /// Cached robots rules, evaluated per path
    pub robots: ParsedRobots,

    /// When the current lock holder's lease runs out
    pub lease_until: Option<DateTime<Utc>>,

    /// When this policy entry stops being authoritative
    pub expires_at: DateTime<Utc>,
}

impl DomainState {
    /// Creates an unlocked policy entry for a freshly fetched robots.txt
    pub fn new(
        domain: &str,
        robots: ParsedRobots,
        valid: bool,
        crawl_delay: f64,
        ttl: Duration,
    ) -> Self {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(1));
        Self {
            domain: domain.to_string(),
            valid,
            lock: false,
            holder: None,
            crawl_delay,
            depth: 1,
            robots,
            lease_until: None,
            expires_at: Utc::now() + ttl,
        }
    }

    /// Checks if this entry has outlived its time-to-live
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Checks if the lock is held by a live lease
    ///
    /// A lock whose lease has lapsed counts as free: its holder crashed or
    /// stalled and the next acquirer may take over.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        if !self.lock {
            return false;
        }
        match self.lease_until {
            Some(until) => now < until,
            None => true,
        }
    }

    /// Checks a URL against the cached robots rules
    pub fn allows(&self, url: &str, user_agent: &str) -> bool {
        self.robots.is_allowed(url, user_agent)
    }

    /// Returns the crawl delay as a duration
    ///
    /// Negative and NaN delays read as zero; values too large for a
    /// `Duration` saturate. Callers clamp to their own ceiling.
    pub fn delay(&self) -> Duration {
        if self.crawl_delay.is_nan() || self.crawl_delay <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.crawl_delay).unwrap_or(Duration::MAX)
    }
}
