use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

use super::JobStore;
use crate::error::StoreError;
use crate::job_processor::{Job, JobStatus, ResultSet, SummaryRecord};

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<Job>,
    jobs: HashMap<String, Job>,
    statuses: HashMap<String, JobStatus>,
    results: HashMap<String, ResultSet>,
    benchmarks: HashMap<String, Duration>,
}

/// In-memory job store for tests/dev.
///
/// A single mutex serializes all updates, so merges are atomic. Entries do
/// not expire.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: &Job) -> Result<(), StoreError> {
        {
            let mut inner = self.lock();
            inner.jobs.insert(job.id.clone(), job.clone());
            inner.statuses.insert(job.id.clone(), JobStatus::Queued);
            inner.queue.push_back(job.clone());
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.lock().queue.pop_front() {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(self.lock().queue.pop_front());
            }
        }
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.lock().jobs.get(job_id).cloned())
    }

    async fn get_result(&self, job_id: &str) -> Result<ResultSet, StoreError> {
        Ok(self.lock().results.get(job_id).cloned().unwrap_or_default())
    }

    async fn merge_result(&self, job_id: &str, record: &SummaryRecord) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .results
            .entry(job_id.to_string())
            .or_default()
            .merge(record.clone()))
    }

    async fn set_status(&self, job_id: &str, status: &JobStatus) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.statuses.get(job_id).is_some_and(JobStatus::is_terminal) {
            return Ok(false);
        }
        inner.statuses.insert(job_id.to_string(), status.clone());
        Ok(true)
    }

    async fn get_status(&self, job_id: &str) -> Result<Option<JobStatus>, StoreError> {
        Ok(self.lock().statuses.get(job_id).cloned())
    }

    async fn set_benchmark(&self, job_id: &str, duration: Duration) -> Result<(), StoreError> {
        self.lock().benchmarks.insert(job_id.to_string(), duration);
        Ok(())
    }

    async fn get_benchmark(&self, job_id: &str) -> Result<Option<Duration>, StoreError> {
        Ok(self.lock().benchmarks.get(job_id).copied())
    }
}
