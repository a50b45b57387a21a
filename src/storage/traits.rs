//! Storage traits and error types
//!
//! `StateStore` covers the three shared namespaces (job, domain, dedup);
//! `WorkQueue` covers the durable at-least-once queues. Every method is a
//! single indivisible operation against the shared store, so any number of
//! worker processes may call them concurrently.

use crate::state::{DomainState, JobStatus};
use crate::task::Task;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store at {path} unreachable after {attempts} attempts")]
    Unavailable { path: String, attempts: u32 },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of claiming a dedup fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupClaim {
    /// This call wrote the entry
    Claimed,
    /// The entry already existed; holds the identifier that wrote it
    AlreadyClaimed(String),
}

impl DedupClaim {
    /// True if the fingerprint now belongs to `identifier`
    pub fn is_owned_by(&self, identifier: &str) -> bool {
        match self {
            Self::Claimed => true,
            Self::AlreadyClaimed(owner) => owner == identifier,
        }
    }
}

/// A message leased from a work queue
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: i64,
    pub queue: String,
    pub body: String,
    /// How many times this message has been handed out, including this one
    pub deliveries: u32,
}

impl Delivery {
    pub fn task(&self) -> serde_json::Result<Task> {
        Task::from_json(&self.body)
    }
}

/// Shared state store: job, domain, and dedup namespaces
pub trait StateStore {
    // ===== Job State =====

    /// Writes (overwrites) the Job State entry for a task
    fn put_job(&self, task: &Task) -> StorageResult<()>;

    /// Reads the Job State entry for a task identifier
    fn get_job(&self, identifier: &str) -> StorageResult<Option<Task>>;

    /// Lists the Job State entries of one crawl session, oldest first
    fn jobs_for_correlation(&self, correlation: &str) -> StorageResult<Vec<Task>>;

    /// Counts Job State entries per status
    fn count_jobs_by_status(&self) -> StorageResult<HashMap<JobStatus, u64>>;

    // ===== Domain State =====

    /// Reads a domain policy; expired entries read as `None`
    fn get_domain(&self, domain: &str) -> StorageResult<Option<DomainState>>;

    /// Stores a freshly resolved policy unless a live one already exists
    ///
    /// Returns the entry that is authoritative after the call: `state` if it
    /// was written, otherwise the entry another worker stored first.
    fn store_domain_policy(&self, state: &DomainState) -> StorageResult<DomainState>;

    /// Atomically takes the domain lock for `holder`
    ///
    /// Succeeds only if the lock is free or its lease has lapsed. Returns
    /// false when another holder has it or the domain has no entry.
    fn try_lock_domain(&self, domain: &str, holder: &str, lease: Duration)
        -> StorageResult<bool>;

    /// Releases the domain lock if `holder` still owns it
    ///
    /// Also counts one serviced fetch against the policy. Returns false if
    /// the lease was lost to another holder in the meantime.
    fn unlock_domain(&self, domain: &str, holder: &str) -> StorageResult<bool>;

    // ===== Dedup Index =====

    /// Records `identifier` as the first claimant of a fingerprint
    ///
    /// Never overwrites an existing entry.
    fn claim_fingerprint(&self, fingerprint: &str, identifier: &str)
        -> StorageResult<DedupClaim>;

    /// Returns the identifier that claimed a fingerprint, if any
    fn fingerprint_owner(&self, fingerprint: &str) -> StorageResult<Option<String>>;

    /// Counts dedup entries
    fn count_fingerprints(&self) -> StorageResult<u64>;
}

/// Durable, at-least-once work queues
pub trait WorkQueue {
    /// Appends a task to a queue
    fn publish(&self, queue: &str, task: &Task) -> StorageResult<()>;

    /// Leases the oldest visible message, hiding it for `visibility`
    ///
    /// A message that is neither acked nor nacked before `visibility`
    /// elapses is handed out again.
    fn receive(&self, queue: &str, visibility: Duration) -> StorageResult<Option<Delivery>>;

    /// Removes a processed message
    fn ack(&self, delivery: &Delivery) -> StorageResult<()>;

    /// Returns a message to the queue, visible again after `delay`
    fn nack(&self, delivery: &Delivery, delay: Duration) -> StorageResult<()>;

    /// Counts messages not yet acknowledged, in flight included
    fn depth(&self, queue: &str) -> StorageResult<u64>;
}
