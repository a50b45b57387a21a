//! Statistics from the shared store
//!
//! This module provides functionality for extracting and displaying job
//! counts and queue depths across all workers.

use crate::state::JobStatus;
use crate::storage::{StateStore, WorkQueue, SCAN_QUEUE, SPIDER_QUEUE};
use crate::CrawlError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Count of Job State entries by status
    pub jobs_by_status: HashMap<JobStatus, u64>,

    /// Unacknowledged messages on the spider queue
    pub spider_queue_depth: u64,

    /// Unacknowledged messages on the scan queue
    pub scan_queue_depth: u64,

    /// URLs claimed across all sessions
    pub claimed_urls: u64,
}

impl CrawlStatistics {
    /// Total number of Job State entries
    pub fn total_jobs(&self) -> u64 {
        self.jobs_by_status.values().sum()
    }

    pub fn count(&self, status: JobStatus) -> u64 {
        self.jobs_by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Loads statistics from the store
///
/// # Arguments
///
/// * `store` - The shared store to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics<S>(store: &S) -> Result<CrawlStatistics, CrawlError>
where
    S: StateStore + WorkQueue,
{
    Ok(CrawlStatistics {
        jobs_by_status: store.count_jobs_by_status()?,
        spider_queue_depth: store.depth(SPIDER_QUEUE)?,
        scan_queue_depth: store.depth(SCAN_QUEUE)?,
        claimed_urls: store.count_fingerprints()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Queues:");
    println!("  {}: {}", SPIDER_QUEUE, stats.spider_queue_depth);
    println!("  {}: {}", SCAN_QUEUE, stats.scan_queue_depth);
    println!();

    let total = stats.total_jobs();
    println!("Jobs by Status ({} total):", total);
    for status in JobStatus::all() {
        let count = stats.count(status);
        let percentage = if total > 0 {
            (count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    println!("Claimed URLs: {}", stats.claimed_urls);
}
