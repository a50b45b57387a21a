//! Per-domain politeness: robots policy cache and the exclusive fetch lock
//!
//! One fetch may be in flight per domain across every spider process. The
//! lock lives in the shared domain state and is taken with a single
//! conditional update, so racing workers cannot both win. Each lock carries
//! a lease: a holder that dies without releasing blocks the domain only
//! until the lease runs out. The lease always covers the request timeout
//! plus the crawl delay served under it.

use crate::config::{Config, LockConfig, LockMode};
use crate::robots::fetch_robots;
use crate::state::DomainState;
use crate::storage::StateStore;
use crate::task::Task;
use crate::CrawlError;
use rand::Rng;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Extra lease time beyond the fetch and the crawl delay, for the blob
/// write and queue hand-off done while the lock is held
const LEASE_MARGIN: Duration = Duration::from_secs(30);

/// Result of trying to take a domain lock
pub enum Acquire<S: StateStore> {
    /// The caller holds the lock until the guard is released
    Held(DomainGuard<S>),
    /// Another worker holds the lock; the task should be requeued
    Busy,
}

/// Serializes fetches per domain and caches robots decisions
pub struct DomainLockManager<S: StateStore> {
    store: Arc<S>,
    client: Client,
    /// Product token matched against robots.txt user-agent groups
    robots_agent: String,
    default_crawl_delay: f64,
    max_crawl_delay: Duration,
    request_timeout: Duration,
    domain_ttl: Duration,
    lock: LockConfig,
}

impl<S: StateStore> DomainLockManager<S> {
    pub fn new(store: Arc<S>, client: Client, config: &Config) -> Self {
        Self {
            store,
            client,
            robots_agent: config.user_agent.crawler_name.clone(),
            default_crawl_delay: config.crawler.default_crawl_delay,
            max_crawl_delay: config.crawler.max_crawl_delay(),
            request_timeout: config.crawler.request_timeout(),
            domain_ttl: config.lock.domain_ttl(),
            lock: config.lock.clone(),
        }
    }

    /// Returns the domain policy for a task, fetching robots.txt on a miss
    ///
    /// A live cached entry is authoritative and robots.txt is not fetched
    /// again until it expires. The task's own path is checked against the
    /// cached rules; a disallowed path fails with `PolicyDenied`.
    pub async fn resolve_policy(&self, task: &Task) -> Result<DomainState, CrawlError> {
        let policy = match self.store.get_domain(&task.domain)? {
            Some(cached) => {
                tracing::debug!("[{}] Using cached policy for {}", task.identifier, task.domain);
                cached
            }
            None => self.fetch_policy(task).await?,
        };

        if !policy.allows(&task.url, &self.robots_agent) {
            return Err(CrawlError::PolicyDenied {
                url: task.url.clone(),
            });
        }

        Ok(policy)
    }

    async fn fetch_policy(&self, task: &Task) -> Result<DomainState, CrawlError> {
        let robots = fetch_robots(&self.client, &task.scheme, &task.domain).await?;
        let valid = robots.is_allowed(&task.url, &self.robots_agent);
        let crawl_delay = robots
            .crawl_delay(&self.robots_agent)
            .unwrap_or(self.default_crawl_delay)
            .min(self.max_crawl_delay.as_secs_f64());

        let fresh = DomainState::new(&task.domain, robots, valid, crawl_delay, self.domain_ttl);
        let stored = self.store.store_domain_policy(&fresh)?;

        tracing::info!(
            "[{}] Cached policy for {}: valid={} crawl-delay={}s",
            task.identifier,
            stored.domain,
            stored.valid,
            stored.crawl_delay
        );
        Ok(stored)
    }

    /// Takes the exclusive fetch lock for a domain
    ///
    /// In `backoff` mode a busy lock is retried with randomized exponential
    /// backoff, failing with `LockTimeout` after `max-attempts` tries. In
    /// `reject` mode a busy lock returns `Acquire::Busy` at once.
    pub async fn acquire(&self, policy: &DomainState) -> Result<Acquire<S>, CrawlError> {
        let holder = Uuid::new_v4().to_string();
        let delay = policy.delay().min(self.max_crawl_delay);
        let lease = self.lease_for(delay);
        let attempts = match self.lock.mode {
            LockMode::Backoff => self.lock.max_attempts,
            LockMode::Reject => 1,
        };

        for attempt in 1..=attempts {
            if self
                .store
                .try_lock_domain(&policy.domain, &holder, lease)?
            {
                tracing::debug!("Locked {} on attempt {}", policy.domain, attempt);
                return Ok(Acquire::Held(DomainGuard {
                    store: Arc::clone(&self.store),
                    domain: policy.domain.clone(),
                    holder,
                    delay,
                    released: false,
                }));
            }

            if self.lock.mode == LockMode::Reject {
                return Ok(Acquire::Busy);
            }

            if attempt < attempts {
                let wait = backoff_delay(&self.lock, attempt);
                tracing::debug!(
                    "{} busy, retrying in {}ms ({}/{})",
                    policy.domain,
                    wait.as_millis(),
                    attempt,
                    attempts
                );
                tokio::time::sleep(wait).await;
            }
        }

        Err(CrawlError::LockTimeout {
            domain: policy.domain.clone(),
            attempts,
        })
    }

    /// Lease long enough for the GET, the crawl delay, and the hand-off
    fn lease_for(&self, delay: Duration) -> Duration {
        let needed = self
            .request_timeout
            .saturating_add(delay)
            .saturating_add(LEASE_MARGIN);
        self.lock.lease().max(needed)
    }
}

/// Randomized exponential backoff for lock retry `attempt` (1-based)
///
/// Doubles from `backoff-base-ms`, capped at `backoff-max-ms`, then picks
/// uniformly from the upper half so waiters spread out.
fn backoff_delay(lock: &LockConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let ceiling = lock
        .backoff_base_ms
        .saturating_mul(1u64 << exponent)
        .min(lock.backoff_max_ms);
    let millis = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
    Duration::from_millis(millis)
}

/// Proof of holding a domain lock
///
/// Call [`DomainGuard::release`] when the fetch is done. Dropping the guard
/// without releasing unlocks immediately, skipping the crawl delay.
pub struct DomainGuard<S: StateStore> {
    store: Arc<S>,
    domain: String,
    holder: String,
    delay: Duration,
    released: bool,
}

impl<S: StateStore> DomainGuard<S> {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Sleeps the crawl delay while still holding the lock, then unlocks
    ///
    /// Returns false if the lease had already lapsed and another worker
    /// took the domain over.
    pub async fn release(mut self) -> Result<bool, CrawlError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.released = true;
        let released = self.store.unlock_domain(&self.domain, &self.holder)?;
        if !released {
            tracing::warn!("Lease on {} lapsed before release", self.domain);
        }
        Ok(released)
    }
}

impl<S: StateStore> Drop for DomainGuard<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.store.unlock_domain(&self.domain, &self.holder) {
            Ok(_) => tracing::debug!("Released {} without crawl delay", self.domain),
            Err(e) => tracing::warn!("Failed to release {}: {}", self.domain, e),
        }
    }
}
