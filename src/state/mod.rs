//! State module for the crawl coordination records
//!
//! # Components
//!
//! - `JobStatus`: lifecycle status of a task as recorded in Job State
//! - `DomainState`: per-domain politeness policy and exclusive-fetch lock

mod domain_state;
mod job_status;

// Re-export main types
pub use domain_state::DomainState;
pub use job_status::JobStatus;
