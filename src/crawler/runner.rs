//! Queue consumption loop shared by spider and scanner workers
//!
//! A worker takes one message at a time. Job State is written by the worker
//! before it returns; the runner then settles the message: acked for every
//! finished outcome, nacked with a short delay for `Busy`, and left alone on
//! store errors so the visibility timeout redelivers it.

use crate::config::QueueConfig;
use crate::storage::WorkQueue;
use crate::task::Task;
use crate::CrawlError;
use async_trait::async_trait;
use tokio::sync::watch;

/// What happened to one task
#[derive(Debug)]
pub enum Outcome {
    /// Handed to the next stage (`spider-crawled`)
    Continue(Task),
    /// Frontier expansion done (`scan-complete`)
    Complete(Task),
    /// Over the depth limit (`limited`)
    Limited(Task),
    /// URL already claimed by another task in the session (`duplicate`)
    Duplicate(Task),
    /// Terminal failure recorded in the task history (`failed`)
    Failed(Task),
    /// Domain lock unavailable; retry later
    Busy,
}

impl Outcome {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Continue(_) => "continue",
            Self::Complete(_) => "complete",
            Self::Limited(_) => "limited",
            Self::Duplicate(_) => "duplicate",
            Self::Failed(_) => "failed",
            Self::Busy => "busy",
        }
    }

    pub fn task(&self) -> Option<&Task> {
        match self {
            Self::Continue(task)
            | Self::Complete(task)
            | Self::Limited(task)
            | Self::Duplicate(task)
            | Self::Failed(task) => Some(task),
            Self::Busy => None,
        }
    }
}

/// A queue consumer
#[async_trait(?Send)]
pub trait Worker {
    /// Name used in logs
    const NAME: &'static str;

    /// Queue this worker consumes
    const QUEUE: &'static str;

    /// Processes one task, recording its Job State
    async fn process(&self, task: Task) -> Result<Outcome, CrawlError>;
}

/// Counters for one run of a worker loop
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub busy: u64,
    pub errors: u64,
}

/// Receives and settles at most one message
///
/// Returns `Ok(None)` when the queue has nothing visible. A message whose
/// body is not a task is acked and dropped so it cannot loop forever.
pub async fn poll_once<W, Q>(
    worker: &W,
    queue: &Q,
    config: &QueueConfig,
) -> Result<Option<Outcome>, CrawlError>
where
    W: Worker,
    Q: WorkQueue,
{
    let Some(delivery) = queue.receive(W::QUEUE, config.visibility_timeout())? else {
        return Ok(None);
    };

    let task = match delivery.task() {
        Ok(task) => task,
        Err(e) => {
            tracing::error!(
                "Dropping malformed message {} on '{}': {}",
                delivery.id,
                delivery.queue,
                e
            );
            queue.ack(&delivery)?;
            return Ok(None);
        }
    };

    if delivery.deliveries > 1 {
        tracing::debug!(
            "[{}] Delivery #{} of message {}",
            task.identifier,
            delivery.deliveries,
            delivery.id
        );
    }

    let outcome = worker.process(task).await?;
    match &outcome {
        Outcome::Busy => queue.nack(&delivery, config.busy_requeue())?,
        _ => queue.ack(&delivery)?,
    }

    Ok(Some(outcome))
}

/// Consumes messages until `shutdown` flips to true
///
/// The in-flight message is always finished before the loop exits.
pub async fn run<W, Q>(
    worker: &W,
    queue: &Q,
    config: &QueueConfig,
    mut shutdown: watch::Receiver<bool>,
) -> RunSummary
where
    W: Worker,
    Q: WorkQueue,
{
    tracing::info!("{} worker consuming from '{}'", W::NAME, W::QUEUE);
    let mut summary = RunSummary::default();

    while !*shutdown.borrow() {
        let idle = match poll_once(worker, queue, config).await {
            Ok(Some(outcome)) => {
                summary.processed += 1;
                if let Outcome::Busy = outcome {
                    summary.busy += 1;
                }
                if let Some(task) = outcome.task() {
                    tracing::info!(
                        "[{}] {} finished: {}",
                        task.identifier,
                        W::NAME,
                        outcome.label()
                    );
                }
                false
            }
            Ok(None) => true,
            Err(e) => {
                summary.errors += 1;
                tracing::error!("{} left message for redelivery: {}", W::NAME, e);
                true
            }
        };

        if idle {
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(config.poll_interval()) => {}
            }
        }
    }

    tracing::info!(
        "{} worker stopped: {} processed, {} busy, {} errors",
        W::NAME,
        summary.processed,
        summary.busy,
        summary.errors
    );
    summary
}

/// Flips to true on Ctrl-C
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, finishing in-flight message");
            let _ = tx.send(true);
        }
    });
    rx
}
