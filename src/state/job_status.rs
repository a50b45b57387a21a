/// Job status definitions for tracking task progress
///
/// A task moves `queued → spider-crawled → scan-complete` on the happy path;
/// every other status is terminal and written by whichever worker stopped it.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the status recorded in a Job State entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    /// Task is waiting on the spider queue
    Queued,

    /// Page was fetched and handed to the scanner
    SpiderCrawled,

    /// Links were extracted and children enqueued
    ScanComplete,

    /// Task exceeded the crawl depth budget
    Limited,

    /// Task failed (policy denial, fetch error, parse error)
    Failed,

    /// URL was already crawled by another task of the same session
    Duplicate,
}

impl JobStatus {
    /// Returns true if no worker will pick this task up again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::SpiderCrawled)
    }

    /// Returns true if this represents an error outcome
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Converts the status to its stored string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::SpiderCrawled => "spider-crawled",
            Self::ScanComplete => "scan-complete",
            Self::Limited => "limited",
            Self::Failed => "failed",
            Self::Duplicate => "duplicate",
        }
    }

    /// Parses a status from its stored string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "spider-crawled" => Some(Self::SpiderCrawled),
            "scan-complete" => Some(Self::ScanComplete),
            "limited" => Some(Self::Limited),
            "failed" => Some(Self::Failed),
            "duplicate" => Some(Self::Duplicate),
            _ => None,
        }
    }

    /// Returns all statuses in lifecycle order
    pub fn all() -> [Self; 6] {
        [
            Self::Queued,
            Self::SpiderCrawled,
            Self::ScanComplete,
            Self::Limited,
            Self::Failed,
            Self::Duplicate,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
