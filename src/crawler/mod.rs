//! Crawl workers
//!
//! This module contains the crawl coordination engine:
//! - Per-domain locking and robots policy caching
//! - HTTP fetching and HTML parsing
//! - The spider (fetch) and scanner (frontier expansion) workers
//! - The queue consumption loop both workers run under

mod fetcher;
mod lock;
mod parser;
mod runner;
mod scanner;
mod spider;

pub use fetcher::{build_http_client, fetch_page, FetchedPage};
pub use lock::{Acquire, DomainGuard, DomainLockManager};
pub use parser::{parse_html, ParsedPage, MAX_PARAGRAPHS};
pub use runner::{poll_once, run, shutdown_signal, Outcome, RunSummary, Worker};
pub use scanner::Scanner;
pub use spider::Spider;

use crate::config::CrawlerConfig;
use crate::storage::{StateStore, WorkQueue, SPIDER_QUEUE};
use crate::task::{make_fetch_task, Task};
use crate::CrawlError;

/// Starts a crawl session from a seed URL
///
/// Creates the root fetch task at depth 1, records it in Job State as
/// `queued`, and publishes it to the spider queue. The returned task's
/// identifier doubles as the session's correlation id.
///
/// # Example
///
/// ```
/// use ripple_crawl::config::CrawlerConfig;
/// use ripple_crawl::crawler::seed;
/// use ripple_crawl::storage::{SqliteStore, WorkQueue, SPIDER_QUEUE};
///
/// let store = SqliteStore::new_in_memory().unwrap();
/// let task = seed(&store, "http://example.com/", &CrawlerConfig::default()).unwrap();
/// assert_eq!(task.correlation, task.identifier);
/// assert_eq!(store.depth(SPIDER_QUEUE).unwrap(), 1);
/// ```
pub fn seed<S>(store: &S, url: &str, config: &CrawlerConfig) -> Result<Task, CrawlError>
where
    S: StateStore + WorkQueue,
{
    let task = make_fetch_task(url, 1, None, config.max_url_length)?;
    store.put_job(&task)?;
    store.publish(SPIDER_QUEUE, &task)?;

    tracing::info!(
        "[{}] Seeded {} (correlation {})",
        task.identifier,
        task.url,
        task.correlation
    );
    Ok(task)
}
