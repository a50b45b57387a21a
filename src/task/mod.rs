//! Task envelope shared by every queue and the job store
//!
//! A task is one JSON object. Workers never edit a task in place: they append
//! a [`StageResult`] and set the overall `status`, so the final Job State
//! entry carries the full causal history of its crawl path.

mod stage;

pub use stage::{timestamp_now, FetchRecord, LinkSummary, ParseRecord, Stage, StageResult};

use crate::state::JobStatus;
use crate::url::{extract_domain, fingerprint, validate_task_url};
use crate::{UrlError, UrlResult};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Which worker a task is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Fetch,
    Parse,
}

/// A unit of work carried on a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub identifier: String,

    /// Crawl session id, shared by every task spawned from one seed
    pub correlation: String,

    pub kind: TaskKind,
    pub status: JobStatus,
    pub url: String,
    pub scheme: String,
    pub domain: String,
    pub path: String,

    /// Hop count from the seed, starting at 1
    pub depth: u32,

    /// Creation time
    pub timestamp: String,

    /// Stage results, oldest first
    #[serde(default)]
    pub data: Vec<StageResult>,
}

/// Creates a new fetch task for `raw_url`
///
/// The URL is validated (`InvalidInput` on failure). Without a correlation
/// the task starts a new crawl session named after its own identifier.
///
/// # Examples
///
/// ```
/// use ripple_crawl::task::{make_fetch_task, TaskKind};
///
/// let seed = make_fetch_task("http://example.com/", 1, None, 128).unwrap();
/// assert_eq!(seed.kind, TaskKind::Fetch);
/// assert_eq!(seed.correlation, seed.identifier);
/// assert_eq!(seed.domain, "example.com");
/// ```
pub fn make_fetch_task(
    raw_url: &str,
    depth: u32,
    correlation: Option<&str>,
    max_url_length: usize,
) -> UrlResult<Task> {
    let url = validate_task_url(raw_url, max_url_length)?;
    let domain = extract_domain(&url).ok_or(UrlError::MissingDomain)?;
    let identifier = Uuid::new_v4().to_string();
    let correlation = correlation
        .map(str::to_string)
        .unwrap_or_else(|| identifier.clone());

    Ok(Task {
        identifier,
        correlation,
        kind: TaskKind::Fetch,
        status: JobStatus::Queued,
        scheme: url.scheme().to_string(),
        domain,
        path: url.path().to_string(),
        url: url.to_string(),
        depth,
        timestamp: timestamp_now(),
        data: Vec::new(),
    })
}

impl Task {
    /// Appends a stage result to the history
    pub fn push_stage(&mut self, stage: Stage) {
        self.data.push(StageResult::new(stage));
    }

    /// Appends a stage result and sets the overall status
    pub fn finish(&mut self, status: JobStatus, stage: Stage) {
        self.push_stage(stage);
        self.status = status;
    }

    /// Returns the most recent fetch result, if the page was fetched
    pub fn fetch_result(&self) -> Option<&FetchRecord> {
        self.data.iter().rev().find_map(|entry| match &entry.stage {
            Stage::FetchResult(record) => Some(record),
            _ => None,
        })
    }

    /// Returns the most recent stage result
    pub fn last_stage(&self) -> Option<&StageResult> {
        self.data.last()
    }

    /// Parses the task URL
    pub fn parsed_url(&self) -> UrlResult<Url> {
        Url::parse(&self.url).map_err(|e| UrlError::Parse(format!("{}: {}", self.url, e)))
    }

    /// Dedup fingerprint of this task's URL within its session
    pub fn fingerprint(&self) -> UrlResult<String> {
        Ok(fingerprint(&self.correlation, &self.parsed_url()?))
    }

    /// Creates a child fetch task in the same crawl session
    pub fn child(&self, raw_url: &str, depth: u32, max_url_length: usize) -> UrlResult<Task> {
        make_fetch_task(raw_url, depth, Some(&self.correlation), max_url_length)
    }

    /// The same task re-addressed to the scanner
    pub fn to_parse_task(&self) -> Task {
        Task {
            kind: TaskKind::Parse,
            ..self.clone()
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_task_defaults() {
        let task = make_fetch_task("http://example.com/a/b?c=1", 1, None, 128).unwrap();
        assert_eq!(task.depth, 1);
        assert_eq!(task.status, JobStatus::Queued);
        assert_eq!(task.scheme, "http");
        assert_eq!(task.domain, "example.com");
        assert_eq!(task.path, "/a/b");
        assert_eq!(task.correlation, task.identifier);
        assert!(task.data.is_empty());
    }

    #[test]
    fn test_identifiers_are_unique() {
        let a = make_fetch_task("http://example.com/", 1, None, 128).unwrap();
        let b = make_fetch_task("http://example.com/", 1, None, 128).unwrap();
        assert_ne!(a.identifier, b.identifier);
    }

    #[test]
    fn test_invalid_seed_rejected() {
        assert!(make_fetch_task("not a url", 1, None, 128).is_err());
        assert!(make_fetch_task("mailto:a@example.com", 1, None, 128).is_err());
        let long = format!("http://example.com/{}", "x".repeat(150));
        assert!(make_fetch_task(&long, 1, None, 128).is_err());
    }

    #[test]
    fn test_child_shares_correlation() {
        let seed = make_fetch_task("http://example.com/", 1, None, 128).unwrap();
        let child = seed.child("http://example.com/next", 2, 128).unwrap();
        assert_eq!(child.correlation, seed.correlation);
        assert_ne!(child.identifier, seed.identifier);
        assert_eq!(child.depth, 2);
    }

    #[test]
    fn test_history_is_append_only() {
        let mut task = make_fetch_task("http://example.com/", 1, None, 128).unwrap();
        task.push_stage(Stage::FetchResult(FetchRecord {
            method: "GET".to_string(),
            code: 200,
            time: 0.1,
            local: "blob://b/k".to_string(),
            depth: 2,
            location: None,
        }));
        task.finish(
            JobStatus::Failed,
            Stage::Error {
                error: "later".to_string(),
                kind: "parse-failed".to_string(),
            },
        );

        assert_eq!(task.data.len(), 2);
        assert_eq!(task.data[0].type_name(), "fetch-result");
        assert_eq!(task.last_stage().unwrap().type_name(), "error");
        assert_eq!(task.fetch_result().unwrap().depth, 2);
        assert_eq!(task.status, JobStatus::Failed);
    }

    #[test]
    fn test_fetch_result_absent() {
        let task = make_fetch_task("http://example.com/", 1, None, 128).unwrap();
        assert!(task.fetch_result().is_none());
    }

    #[test]
    fn test_to_parse_task_keeps_identity() {
        let task = make_fetch_task("http://example.com/", 1, None, 128).unwrap();
        let parse = task.to_parse_task();
        assert_eq!(parse.kind, TaskKind::Parse);
        assert_eq!(parse.identifier, task.identifier);
        assert_eq!(parse.correlation, task.correlation);
    }

    #[test]
    fn test_json_envelope_fields() {
        let task = make_fetch_task("http://example.com/", 1, None, 128).unwrap();
        let value: serde_json::Value = serde_json::from_str(&task.to_json().unwrap()).unwrap();
        for field in ["identifier", "correlation", "status", "data", "kind", "depth", "url"] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
        assert_eq!(value["kind"], "fetch");
        assert_eq!(value["status"], "queued");
    }

    #[test]
    fn test_fingerprint_matches_session() {
        let seed = make_fetch_task("http://example.com/page", 1, None, 128).unwrap();
        let again = seed.child("http://example.com/page#frag", 2, 128).unwrap();
        assert_eq!(seed.fingerprint().unwrap(), again.fingerprint().unwrap());
    }
}
