//! Fetch worker
//!
//! Takes one fetch task at a time: enforces the depth limit, rejects
//! duplicates, resolves robots policy, holds the domain lock for the GET and
//! the crawl delay, stores the body, and hands the task to the scanner.

use crate::config::Config;
use crate::crawler::fetcher::{fetch_page, FetchedPage};
use crate::crawler::lock::{Acquire, DomainLockManager};
use crate::crawler::runner::{Outcome, Worker};
use crate::state::JobStatus;
use crate::storage::{
    page_key, BlobRef, BlobStore, DedupClaim, StateStore, WorkQueue, SCAN_QUEUE, SPIDER_QUEUE,
};
use crate::task::{FetchRecord, Stage, Task};
use crate::CrawlError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

/// Fetch worker bound to one store, one blob store, and one HTTP client
pub struct Spider<S: StateStore + WorkQueue> {
    store: Arc<S>,
    blobs: Arc<dyn BlobStore>,
    client: Client,
    locks: DomainLockManager<S>,
    max_depth: u32,
    max_body_bytes: usize,
    bucket: String,
}

impl<S: StateStore + WorkQueue> Spider<S> {
    pub fn new(store: Arc<S>, blobs: Arc<dyn BlobStore>, client: Client, config: &Config) -> Self {
        Self {
            locks: DomainLockManager::new(Arc::clone(&store), client.clone(), config),
            store,
            blobs,
            client,
            max_depth: config.crawler.max_depth,
            max_body_bytes: config.crawler.max_body_bytes,
            bucket: config.store.bucket.clone(),
        }
    }

    /// Processes one fetch task
    ///
    /// Expected branches (depth limit, duplicate, busy lock, policy denial,
    /// fetch failure) come back as an [`Outcome`]; an `Err` means the shared
    /// store itself failed and the message should be redelivered.
    pub async fn handle(&self, mut task: Task) -> Result<Outcome, CrawlError> {
        tracing::info!(
            "[{}] Spider received {} (depth {})",
            task.identifier,
            task.url,
            task.depth
        );

        if task.depth > self.max_depth {
            tracing::info!(
                "[{}] Depth {} exceeds limit {}",
                task.identifier,
                task.depth,
                self.max_depth
            );
            let reason = CrawlError::DepthExceeded {
                depth: task.depth,
                max_depth: self.max_depth,
            };
            task.finish(
                JobStatus::Limited,
                Stage::DepthLimited {
                    status: reason.to_string(),
                },
            );
            self.store.put_job(&task)?;
            return Ok(Outcome::Limited(task));
        }

        let fingerprint = match task.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(e) => return self.fail(task, e.into()),
        };

        if let Some(owner) = self.store.fingerprint_owner(&fingerprint)? {
            if owner != task.identifier {
                return self.duplicate(task, owner);
            }
        }

        let policy = match self.locks.resolve_policy(&task).await {
            Ok(policy) => policy,
            Err(e @ (CrawlError::PolicyDenied { .. } | CrawlError::FetchFailed { .. })) => {
                return self.fail(task, e)
            }
            Err(e) => return Err(e),
        };

        let guard = match self.locks.acquire(&policy).await {
            Ok(Acquire::Held(guard)) => guard,
            Ok(Acquire::Busy) => {
                tracing::warn!("[{}] {} is busy, requeueing", task.identifier, task.domain);
                return Ok(Outcome::Busy);
            }
            Err(CrawlError::LockTimeout { domain, attempts }) => {
                tracing::warn!(
                    "[{}] Gave up on {} after {} attempts, requeueing",
                    task.identifier,
                    domain,
                    attempts
                );
                return Ok(Outcome::Busy);
            }
            Err(e) => return Err(e),
        };

        let fetched = fetch_page(&self.client, &task.url, self.max_body_bytes).await;

        // The body is stored and handed off while the domain is still held
        let outcome = match fetched {
            Ok(page) => self.handle_response(task, &fingerprint, page).await,
            Err(e) => self.fail(task, e),
        };

        if let Err(e) = guard.release().await {
            tracing::error!("Failed to release domain lock: {}", e);
        }

        outcome
    }

    async fn handle_response(
        &self,
        mut task: Task,
        fingerprint: &str,
        page: FetchedPage,
    ) -> Result<Outcome, CrawlError> {
        tracing::info!(
            "[{}] GET {} -> {} in {:.3}s",
            task.identifier,
            task.url,
            page.status,
            page.elapsed
        );

        if !page.is_success() {
            // the server answered for this URL, so it is not retried in this session
            if page.is_claimable() {
                if let Some(owner) = self.claim(fingerprint, &task)? {
                    return self.duplicate(task, owner);
                }
            }
            let error = CrawlError::FetchFailed {
                url: task.url.clone(),
                message: format!("HTTP {}", page.status),
            };
            return self.fail(task, error);
        }

        let blob = BlobRef::new(&self.bucket, &page_key(&task.identifier));
        let content_type = if page.content_type.is_empty() {
            "text/html"
        } else {
            page.content_type.as_str()
        };
        if let Err(e) = self.blobs.put(&blob, &page.body, content_type).await {
            return self.fail(task, e.into());
        }

        // claimed only once the body is stored, so a blob fault leaves the URL open
        if let Some(owner) = self.claim(fingerprint, &task)? {
            return self.duplicate(task, owner);
        }

        task.finish(
            JobStatus::SpiderCrawled,
            Stage::FetchResult(FetchRecord {
                method: "GET".to_string(),
                code: page.status,
                time: page.elapsed,
                local: blob.to_string(),
                depth: task.depth + 1,
                location: Some(page.final_url),
            }),
        );

        self.store.put_job(&task)?;
        self.store.publish(SCAN_QUEUE, &task.to_parse_task())?;
        tracing::info!("[{}] Stored {} and queued scan", task.identifier, blob);

        Ok(Outcome::Continue(task))
    }

    /// Claims the URL for this task; returns the other owner if it lost
    fn claim(&self, fingerprint: &str, task: &Task) -> Result<Option<String>, CrawlError> {
        match self.store.claim_fingerprint(fingerprint, &task.identifier)? {
            DedupClaim::AlreadyClaimed(owner) if owner != task.identifier => Ok(Some(owner)),
            _ => Ok(None),
        }
    }

    fn duplicate(&self, mut task: Task, owner: String) -> Result<Outcome, CrawlError> {
        tracing::info!(
            "[{}] {} already claimed by {}",
            task.identifier,
            task.url,
            owner
        );
        task.finish(JobStatus::Duplicate, Stage::Duplicate { owner });
        self.store.put_job(&task)?;
        Ok(Outcome::Duplicate(task))
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
impl<S: StateStore + WorkQueue> Worker for Spider<S> {
    const NAME: &'static str = "spider";
    const QUEUE: &'static str = SPIDER_QUEUE;

    async fn process(&self, task: Task) -> Result<Outcome, CrawlError> {
        self.handle(task).await
    }
}
