//! Queue consumer: pulls jobs one at a time and runs them to a terminal status.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::job_processor::{JobProcessor, JobStatus};
use crate::job_store::JobStore;

/// Pause after a failed dequeue before trying again
const STORE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Id of the job a worker is currently running, shared with the shutdown handler
#[derive(Debug, Clone, Default)]
pub struct ActiveJob(Arc<Mutex<Option<String>>>);

impl ActiveJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, job_id: &str) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(job_id.to_string());
    }

    pub fn clear(&self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

pub struct Worker {
    jobs: Arc<dyn JobStore>,
    processor: JobProcessor,
    active: ActiveJob,
    dequeue_timeout: Duration,
}

impl Worker {
    pub fn new(jobs: Arc<dyn JobStore>, processor: JobProcessor, dequeue_timeout: Duration) -> Self {
        Self {
            jobs,
            processor,
            active: ActiveJob::new(),
            dequeue_timeout,
        }
    }

    pub fn active_job(&self) -> ActiveJob {
        self.active.clone()
    }

    /// Process jobs until `shutdown` is cancelled. Returns the number of jobs run.
    pub async fn run(&self, shutdown: CancellationToken) -> usize {
        info!("Worker started, waiting for jobs");
        let mut processed = 0;

        while !shutdown.is_cancelled() {
            let dequeued = tokio::select! {
                _ = shutdown.cancelled() => break,
                dequeued = self.jobs.dequeue(self.dequeue_timeout) => dequeued,
            };

            let job = match dequeued {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    error!("Failed to dequeue job: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(STORE_ERROR_BACKOFF) => continue,
                    }
                }
            };

            if let Err(e) = job.validate() {
                warn!("Rejecting invalid job {}: {}", job.id, e);
                let status = JobStatus::Failed {
                    reason: e.to_string(),
                };
                if let Err(e) = self.jobs.set_status(&job.id, &status).await {
                    error!("Failed to record status for job {}: {}", job.id, e);
                }
                continue;
            }

            self.active.set(&job.id);
            let report = self.processor.run(&job, &shutdown).await;
            self.active.clear();
            processed += 1;

            info!(
                "Job {} ended as {} ({} objects in {:?})",
                report.job_id,
                report.status,
                report.processed(),
                report.duration
            );
        }

        info!("Worker stopped after {} jobs", processed);
        processed
    }
}

/// Record the active job as stopped and signal the worker to wind down.
///
/// In-flight objects are not interrupted; the processor stops dispatching
/// and the stopped status is kept when it finishes.
pub async fn handle_shutdown(jobs: &dyn JobStore, active: &ActiveJob, shutdown: &CancellationToken) {
    if let Some(job_id) = active.get() {
        info!("Shutdown requested, marking job {} as stopped", job_id);
        match jobs.set_status(&job_id, &JobStatus::Stopped).await {
            Ok(true) => {}
            Ok(false) => info!("Job {} had already finished", job_id),
            Err(e) => error!("Failed to mark job {} as stopped: {}", job_id, e),
        }
    } else {
        info!("Shutdown requested while idle");
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::job_processor::Job;
    use crate::job_store::InMemoryJobStore;
    use crate::model_runner::{GenerationParams, SummaryModel};
    use crate::object_store::InMemoryObjectStore;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl SummaryModel for Echo {
        fn model_id(&self) -> &str {
            "echo"
        }

        async fn complete(&self, _prompt: &str, _params: &GenerationParams) -> anyhow::Result<String> {
            Ok("Case Subject: echo".to_string())
        }
    }

    fn worker(jobs: Arc<InMemoryJobStore>, objects: Arc<InMemoryObjectStore>) -> Worker {
        let processor = JobProcessor::new(objects, jobs.clone(), Arc::new(Echo), &WorkerConfig::default());
        Worker::new(jobs, processor, Duration::from_millis(20))
    }

    async fn wait_for_terminal(jobs: &InMemoryJobStore, job_id: &str) -> JobStatus {
        for _ in 0..200 {
            if let Some(status) = jobs.get_status(job_id).await.unwrap() {
                if status.is_terminal() {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal status", job_id);
    }

    #[test]
    fn test_active_job_slot() {
        let active = ActiveJob::new();
        let shared = active.clone();
        assert_eq!(active.get(), None);
        active.set("job-1");
        assert_eq!(shared.get().as_deref(), Some("job-1"));
        shared.clear();
        assert_eq!(active.get(), None);
    }

    #[tokio::test]
    async fn test_worker_runs_queued_jobs_until_shutdown() {
        let jobs = InMemoryJobStore::arc();
        let objects = Arc::new(InMemoryObjectStore::new());
        objects.insert("bucket", "a.txt", "A decision text long enough to be sent to the model for a summary.");

        let job = Job::new("bucket", "", 10, 2).unwrap();
        jobs.enqueue(&job).await.unwrap();

        let shutdown = CancellationToken::new();
        let worker = Arc::new(worker(jobs.clone(), objects));
        let handle = {
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        };

        assert_eq!(wait_for_terminal(&jobs, &job.id).await, JobStatus::Completed);
        assert_eq!(jobs.get_result(&job.id).await.unwrap().len(), 1);

        shutdown.cancel();
        assert_eq!(handle.await.unwrap(), 1);
        assert_eq!(worker.active_job().get(), None);
    }

    #[tokio::test]
    async fn test_invalid_job_is_failed_without_processing() {
        let jobs = InMemoryJobStore::arc();
        let mut job = Job::new("bucket", "", 10, 2).unwrap();
        job.max_files = 0;
        jobs.enqueue(&job).await.unwrap();

        let shutdown = CancellationToken::new();
        let worker = Arc::new(worker(jobs.clone(), Arc::new(InMemoryObjectStore::new())));
        let handle = {
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        };

        let status = wait_for_terminal(&jobs, &job.id).await;
        assert!(matches!(status, JobStatus::Failed { reason } if reason.contains("max_files")));

        shutdown.cancel();
        assert_eq!(handle.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_marks_active_job_stopped() {
        let jobs = InMemoryJobStore::new();
        let active = ActiveJob::new();
        let shutdown = CancellationToken::new();
        jobs.set_status("job-1", &JobStatus::Running).await.unwrap();
        active.set("job-1");

        handle_shutdown(&jobs, &active, &shutdown).await;

        assert!(shutdown.is_cancelled());
        assert_eq!(jobs.get_status("job-1").await.unwrap(), Some(JobStatus::Stopped));
        // A later completion attempt does not overwrite the stopped status
        assert!(!jobs.set_status("job-1", &JobStatus::Completed).await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_while_idle_only_cancels() {
        let jobs = InMemoryJobStore::new();
        let shutdown = CancellationToken::new();
        handle_shutdown(&jobs, &ActiveJob::new(), &shutdown).await;
        assert!(shutdown.is_cancelled());
    }
}
