//! Ripple: a politeness-aware, depth-bounded distributed web crawler
//!
//! Independent worker processes cooperate through a shared state store and
//! durable work queues. Spider workers fetch pages one domain at a time,
//! honoring robots.txt and crawl delays; scanner workers extract links from
//! fetched pages and feed new fetch tasks back into the queue until the depth
//! limit is reached.

pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod task;
pub mod url;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] UrlError),

    #[error("URL disallowed by robots.txt: {url}")]
    PolicyDenied { url: String },

    #[error("Depth limit reached: {depth} > {max_depth}")]
    DepthExceeded { depth: u32, max_depth: u32 },

    #[error("Failed to obtain lock for domain {domain} after {attempts} attempts")]
    LockTimeout { domain: String, attempts: u32 },

    #[error("Fetch failed for {url}: {message}")]
    FetchFailed { url: String, message: String },

    #[error("Parse failed: {0}")]
    ParseFailed(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Blob error: {0}")]
    Blob(#[from] storage::BlobError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Short machine-readable name recorded in `error` stage results
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InvalidInput(_) => "invalid-input",
            Self::PolicyDenied { .. } => "policy-denied",
            Self::DepthExceeded { .. } => "depth-exceeded",
            Self::LockTimeout { .. } => "lock-timeout",
            Self::FetchFailed { .. } | Self::Reqwest(_) => "fetch-failed",
            Self::ParseFailed(_) | Self::Blob(_) => "parse-failed",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("URL length {length} over limit of {limit}")]
    TooLong { length: usize, limit: usize },

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{DomainState, JobStatus};
pub use task::{StageResult, Task, TaskKind};
