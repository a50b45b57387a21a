//! Shared storage for crawl workers
//!
//! This module holds everything workers share across process boundaries:
//! - Job State, Domain State, and the dedup index (`StateStore`)
//! - Durable work queues (`WorkQueue`)
//! - Page bodies (`BlobStore`)
//!
//! State and queues live in one SQLite file that every worker opens.

mod blob;
mod schema;
mod sqlite;
mod traits;

pub use blob::{page_key, BlobError, BlobRef, BlobStore, FsBlobStore, MemoryBlobStore};
pub use sqlite::SqliteStore;
pub use traits::{DedupClaim, Delivery, StateStore, StorageError, StorageResult, WorkQueue};

use std::path::Path;
use std::time::Duration;

/// Queue feeding spider workers
pub const SPIDER_QUEUE: &str = "spider";

/// Queue feeding scanner workers
pub const SCAN_QUEUE: &str = "scan";

/// Opens the shared store, retrying while it is unreachable
///
/// Attempt `n` that fails waits `n²` seconds before the next one. After
/// `attempts` failures the last error is reported as `Unavailable`.
pub async fn connect_with_retry(path: &Path, attempts: u32) -> StorageResult<SqliteStore> {
    connect_with_backoff(path, attempts, Duration::from_secs(1)).await
}

async fn connect_with_backoff(
    path: &Path,
    attempts: u32,
    unit: Duration,
) -> StorageResult<SqliteStore> {
    for attempt in 1..=attempts {
        match SqliteStore::new(path) {
            Ok(store) => {
                tracing::info!("Connected to store {} (attempt {})", path.display(), attempt);
                return Ok(store);
            }
            Err(e) => {
                tracing::warn!(
                    "Store {} unreachable (attempt {}/{}): {}",
                    path.display(),
                    attempt,
                    attempts,
                    e
                );
                if attempt < attempts {
                    tokio::time::sleep(unit * attempt * attempt).await;
                }
            }
        }
    }

    Err(StorageError::Unavailable {
        path: path.display().to_string(),
        attempts,
    })
}
