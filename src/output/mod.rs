//! Read-only views over the shared store
//!
//! This module handles:
//! - Job State lookups for a task or a whole crawl session
//! - Aggregate statistics (job counts and queue depths)

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use crate::storage::StateStore;
use crate::task::Task;
use crate::CrawlError;

/// Looks up Job State by task identifier, falling back to a session id
///
/// A seed's identifier is also its session's correlation id, so passing it
/// returns every task of that crawl, oldest first.
pub fn find_jobs<S: StateStore>(store: &S, id: &str) -> Result<Vec<Task>, CrawlError> {
    let session = store.jobs_for_correlation(id)?;
    if !session.is_empty() {
        return Ok(session);
    }

    Ok(store.get_job(id)?.into_iter().collect())
}

/// Renders Job State entries as pretty-printed JSON
pub fn render_jobs(jobs: &[Task]) -> Result<String, CrawlError> {
    Ok(serde_json::to_string_pretty(jobs)?)
}
