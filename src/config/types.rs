use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub lock: LockConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub store: StoreConfig,
    pub queue: QueueConfig,
}

/// Crawl budget and fetch behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Tasks deeper than this are rejected as `limited`
    pub max_depth: u32,

    /// Fan-out cap: new fetch tasks created per scanned page
    pub max_links_per_page: usize,

    /// Longest absolute URL accepted for a task
    pub max_url_length: usize,

    /// Crawl delay (seconds) when robots.txt declares none
    pub default_crawl_delay: f64,

    /// Ceiling on any robots.txt crawl delay (seconds)
    pub max_crawl_delay: f64,

    /// Client-side timeout for every HTTP request (seconds)
    pub request_timeout: u64,

    /// Largest response body a spider will read
    pub max_body_bytes: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_links_per_page: 5,
            max_url_length: crate::url::DEFAULT_MAX_URL_LENGTH,
            default_crawl_delay: 10.0,
            max_crawl_delay: 60.0,
            request_timeout: 30,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn max_crawl_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_crawl_delay).unwrap_or(Duration::ZERO)
    }
}

/// What a spider does when a domain lock is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockMode {
    /// Retry with randomized exponential backoff, then give up
    Backoff,
    /// Put the task straight back on the queue
    Reject,
}

/// Domain lock and policy cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LockConfig {
    pub mode: LockMode,

    /// Acquisition attempts before `LockTimeout` (backoff mode)
    pub max_attempts: u32,

    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,

    /// How long a held lock stays valid without being released (seconds)
    pub lease_seconds: u64,

    /// Lifetime of a cached domain policy (seconds)
    pub domain_ttl: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            mode: LockMode::Backoff,
            max_attempts: 20,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            lease_seconds: 300,
            domain_ttl: 86_400,
        }
    }
}

impl LockConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }

    pub fn domain_ttl(&self) -> Duration {
        Duration::from_secs(self.domain_ttl)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Product token, also used to match robots.txt groups
    pub crawler_name: String,

    pub crawler_version: String,

    /// Optional page describing the crawler
    pub contact_url: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "asynchronousgillz".to_string(),
            crawler_version: "1.1".to_string(),
            contact_url: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL)`
    pub fn header(&self) -> String {
        match &self.contact_url {
            Some(url) => format!("{}/{} (+{})", self.crawler_name, self.crawler_version, url),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

/// Shared state store and blob store locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StoreConfig {
    /// SQLite file shared by all workers
    pub database_path: String,

    /// Directory holding one subdirectory per bucket
    pub blob_root: String,

    pub bucket: String,

    /// Startup attempts before the worker gives up
    pub connect_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "ripple.db".to_string(),
            blob_root: "./blobs".to_string(),
            bucket: "term-project".to_string(),
            connect_attempts: 10,
        }
    }
}

/// Work queue consumption settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Seconds a received message stays invisible before redelivery
    pub visibility_timeout: u64,

    /// Sleep between polls of an empty queue
    pub poll_interval_ms: u64,

    /// Delay before a lock-contended task becomes visible again
    pub busy_requeue_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: 600,
            poll_interval_ms: 500,
            busy_requeue_ms: 1_000,
        }
    }
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn busy_requeue(&self) -> Duration {
        Duration::from_millis(self.busy_requeue_ms)
    }
}
