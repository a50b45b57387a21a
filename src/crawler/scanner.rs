//! Frontier expansion worker
//!
//! Reads the body a spider stored, extracts links, and turns up to
//! `max-links-per-page` unseen ones into child fetch tasks in the same crawl
//! session. No domain lock is involved.

use crate::config::Config;
use crate::crawler::parser::{parse_html, ParsedPage};
use crate::crawler::runner::{Outcome, Worker};
use crate::state::JobStatus;
use crate::storage::{BlobRef, BlobStore, StateStore, WorkQueue, SCAN_QUEUE, SPIDER_QUEUE};
use crate::task::{FetchRecord, ParseRecord, Stage, Task};
use crate::url::{fingerprint, validate_task_url};
use crate::{CrawlError, UrlError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// Parse worker bound to one store and one blob store
pub struct Scanner<S: StateStore + WorkQueue> {
    store: Arc<S>,
    blobs: Arc<dyn BlobStore>,
    max_links_per_page: usize,
    max_url_length: usize,
}

impl<S: StateStore + WorkQueue> Scanner<S> {
    pub fn new(store: Arc<S>, blobs: Arc<dyn BlobStore>, config: &Config) -> Self {
        Self {
            store,
            blobs,
            max_links_per_page: config.crawler.max_links_per_page,
            max_url_length: config.crawler.max_url_length,
        }
    }

    /// Processes one parse task
    ///
    /// Child tasks are recorded in Job State and published before the
    /// parent's `scan-complete` entry is written. A missing fetch result or
    /// blob finalizes the task as `failed` with no children.
    pub async fn handle(&self, mut task: Task) -> Result<Outcome, CrawlError> {
        tracing::info!("[{}] Scanner received {}", task.identifier, task.url);

        let Some(record) = task.fetch_result().cloned() else {
            let error =
                CrawlError::ParseFailed(format!("task {} has no fetch-result", task.identifier));
            return self.fail(task, error);
        };

        let page = match self.load_page(&task, &record).await {
            Ok(page) => page,
            Err(e) => return self.fail(task, e),
        };

        let children = self.expand(&task, &page, record.depth)?;

        for child in &children {
            self.store.put_job(child)?;
            self.store.publish(SPIDER_QUEUE, child)?;
            tracing::debug!(
                "[{}] Queued child {} for {}",
                task.identifier,
                child.identifier,
                child.url
            );
        }

        tracing::info!(
            "[{}] Found {} links, queued {} children",
            task.identifier,
            page.links.len(),
            children.len()
        );

        task.finish(
            JobStatus::ScanComplete,
            Stage::ParseResult(ParseRecord {
                title: page.title,
                links: page.links,
                text: page.paragraphs,
                children: children.into_iter().map(|c| c.identifier).collect(),
            }),
        );
        self.store.put_job(&task)?;

        Ok(Outcome::Complete(task))
    }

    /// Reads the stored body and parses it against the URL it was served from
    async fn load_page(&self, task: &Task, record: &FetchRecord) -> Result<ParsedPage, CrawlError> {
        let blob = BlobRef::parse(&record.local)?;
        let bytes = self.blobs.get(&blob).await?;
        let base_url = match &record.location {
            Some(location) => Url::parse(location).map_err(|e| UrlError::Parse(e.to_string()))?,
            None => task.parsed_url()?,
        };

        let html = String::from_utf8_lossy(&bytes);
        Ok(parse_html(&html, &base_url))
    }

    /// Builds child fetch tasks from a page's links
    ///
    /// Links that fail validation, repeat an earlier link on the same page,
    /// or are already in the dedup index are skipped and do not count toward
    /// the cap.
    fn expand(
        &self,
        task: &Task,
        page: &ParsedPage,
        child_depth: u32,
    ) -> Result<Vec<Task>, CrawlError> {
        let mut seen = HashSet::new();
        let mut children = Vec::new();

        for link in &page.links {
            if children.len() >= self.max_links_per_page {
                break;
            }

            let url = match validate_task_url(&link.href, self.max_url_length) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("[{}] Skipping {}: {}", task.identifier, link.href, e);
                    continue;
                }
            };

            let fp = fingerprint(&task.correlation, &url);
            if !seen.insert(fp.clone()) {
                continue;
            }

            if let Some(owner) = self.store.fingerprint_owner(&fp)? {
                tracing::debug!(
                    "[{}] Skipping {}: already crawled by {}",
                    task.identifier,
                    url,
                    owner
                );
                continue;
            }

            match task.child(url.as_str(), child_depth, self.max_url_length) {
                Ok(child) => children.push(child),
                Err(e) => tracing::debug!("[{}] Skipping {}: {}", task.identifier, url, e),
            }
        }

        Ok(children)
    }

    fn fail(&self, mut task: Task, error: CrawlError) -> Result<Outcome, CrawlError> {
        tracing::error!("[{}] {}", task.identifier, error);
        task.finish(
            JobStatus::Failed,
            Stage::Error {
                error: error.to_string(),
                kind: error.kind().to_string(),
            },
        );
        self.store.put_job(&task)?;
        Ok(Outcome::Failed(task))
    }
}

#[async_trait(?Send)]
impl<S: StateStore + WorkQueue> Worker for Scanner<S> {
    const NAME: &'static str = "scanner";
    const QUEUE: &'static str = SCAN_QUEUE;

    async fn process(&self, task: Task) -> Result<Outcome, CrawlError> {
        self.handle(task).await
    }
}
