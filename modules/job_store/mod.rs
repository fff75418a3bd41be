//! Job store: queue, status, result sets and timings for summarization jobs.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;
use crate::job_processor::{Job, JobStatus, ResultSet, SummaryRecord};

pub use memory::InMemoryJobStore;
pub use redis_store::RedisJobStore;

/// Retention of job-scoped data after creation
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(3600);

/// Job store abstraction.
///
/// `merge_result` must be safe when several objects of the same job finish
/// at once, and `set_status` never leaves a terminal status.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Append a job to the FIFO queue and mark it queued.
    async fn enqueue(&self, job: &Job) -> Result<(), StoreError>;

    /// Pop the oldest job, waiting up to `timeout`. `None` on timeout.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>, StoreError>;

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    /// Current result set; empty if none has been written.
    async fn get_result(&self, job_id: &str) -> Result<ResultSet, StoreError>;

    /// Atomically add one record. Returns whether it was stored
    /// (an existing real summary is never replaced by a placeholder).
    async fn merge_result(&self, job_id: &str, record: &SummaryRecord) -> Result<bool, StoreError>;

    /// Record a status. Returns `false` if the job is already terminal.
    async fn set_status(&self, job_id: &str, status: &JobStatus) -> Result<bool, StoreError>;

    async fn get_status(&self, job_id: &str) -> Result<Option<JobStatus>, StoreError>;

    async fn set_benchmark(&self, job_id: &str, duration: Duration) -> Result<(), StoreError>;

    async fn get_benchmark(&self, job_id: &str) -> Result<Option<Duration>, StoreError>;
}
