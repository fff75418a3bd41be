//! Core job processing logic

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::markdown::render_report;
use super::types::{Job, JobReport, JobStatus, ObjectOutcome, SummaryRecord};
use crate::config::WorkerConfig;
use crate::error::{JobError, StoreError};
use crate::file_discovery::{find_checkpoint, ObjectLister, OutputLayout};
use crate::job_store::JobStore;
use crate::model_runner::SummaryModel;
use crate::object_fetcher::ObjectFetcher;
use crate::object_store::ObjectStore;
use crate::summarizer::Summarizer;
use crate::summary_parser::{parse_summary, placeholder, SOURCE_ERROR};

/// Object metadata attached to summary outputs
pub const SOURCE_KEY_METADATA: &str = "source-key";
pub const JOB_ID_METADATA: &str = "job-id";

#[derive(Debug, Default)]
struct Tally {
    summarized: usize,
    reused: usize,
    placeholders: usize,
    warnings: Vec<String>,
}

impl Tally {
    fn record(&mut self, outcome: ObjectOutcome) {
        match outcome {
            ObjectOutcome::Summarized => self.summarized += 1,
            ObjectOutcome::Reused => self.reused += 1,
            ObjectOutcome::Placeholder => self.placeholders += 1,
        }
    }

    fn processed(&self) -> usize {
        self.summarized + self.reused + self.placeholders
    }

    fn warn(&mut self, warning: String) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// Drives one job from listing to a terminal status.
///
/// Objects are processed by at most `max_workers` concurrent tasks; every
/// finished object is merged into the job's result set before the next one
/// is counted, so a crash loses at most the objects still in flight.
pub struct JobProcessor {
    objects: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobStore>,
    fetcher: ObjectFetcher,
    summarizer: Summarizer,
    config: WorkerConfig,
}

impl JobProcessor {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobStore>,
        model: Arc<dyn SummaryModel>,
        config: &WorkerConfig,
    ) -> Self {
        let summarizer = Summarizer::new(
            model,
            config.text_splitter(),
            config.retry_policy(),
            config.summarizer_settings(),
        );

        Self {
            fetcher: ObjectFetcher::new(objects.clone()),
            objects,
            jobs,
            summarizer,
            config: config.clone(),
        }
    }

    // === Main Execution ===

    /// Run `job` to a terminal status and record its duration.
    ///
    /// Cancelling `cancel` stops dispatching new objects; objects already in
    /// flight finish and the job ends as stopped.
    pub async fn run(&self, job: &Job, cancel: &CancellationToken) -> JobReport {
        let started = Instant::now();
        info!(
            "Starting job {} for s3://{}/{} (max_files={}, max_workers={})",
            job.id, job.bucket, job.prefix, job.max_files, job.max_workers
        );

        let mut tally = Tally::default();

        match self.jobs.set_status(&job.id, &JobStatus::Running).await {
            Ok(true) => {}
            Ok(false) => {
                let status = self.current_status(&job.id).await;
                warn!("Job {} is already {}; not processing", job.id, status);
                return self.report(job, status, &tally, started.elapsed());
            }
            Err(e) => {
                let status = JobStatus::Failed {
                    reason: e.to_string(),
                };
                return self.finish(job, status, tally, started).await;
            }
        }

        let status = match self.process_objects(job, cancel, &mut tally).await {
            Ok(()) if cancel.is_cancelled() => {
                info!("Job {} stopped after {} objects", job.id, tally.processed());
                JobStatus::Stopped
            }
            Ok(()) => JobStatus::Completed,
            Err(e) => {
                error!("Job {} failed: {}", job.id, e);
                JobStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        if let Err(warning) = self.upload_report(job, &status, started.elapsed()).await {
            tally.warn(warning);
        }
        self.finish(job, status, tally, started).await
    }

    /// Record the benchmark and terminal status
    async fn finish(&self, job: &Job, status: JobStatus, mut tally: Tally, started: Instant) -> JobReport {
        let duration = started.elapsed();

        if let Err(e) = self.jobs.set_benchmark(&job.id, duration).await {
            tally.warn(format!("Failed to record benchmark for job {}: {}", job.id, e));
        }

        let status = match self.jobs.set_status(&job.id, &status).await {
            Ok(true) => status,
            Ok(false) => {
                // Someone else (the shutdown handler) already ended the job
                self.current_status(&job.id).await
            }
            Err(e) => {
                error!("Failed to record status {} for job {}: {}", status, job.id, e);
                status
            }
        };

        info!(
            "Job {} finished as {} in {:?} ({} summarized, {} reused, {} errors)",
            job.id, status, duration, tally.summarized, tally.reused, tally.placeholders
        );
        self.report(job, status, &tally, duration)
    }

    async fn current_status(&self, job_id: &str) -> JobStatus {
        match self.jobs.get_status(job_id).await {
            Ok(Some(status)) => status,
            Ok(None) => JobStatus::Stopped,
            Err(e) => JobStatus::Failed {
                reason: e.to_string(),
            },
        }
    }

    fn report(&self, job: &Job, status: JobStatus, tally: &Tally, duration: Duration) -> JobReport {
        JobReport {
            job_id: job.id.clone(),
            status,
            summarized: tally.summarized,
            reused: tally.reused,
            placeholders: tally.placeholders,
            duration,
            warnings: tally.warnings.clone(),
        }
    }

    // === Object Dispatch ===

    async fn process_objects(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        tally: &mut Tally,
    ) -> Result<(), JobError> {
        let layout = self.config.output_layout(&job.prefix);

        let checkpoint = if self.config.resume_from_checkpoint {
            let checkpoint = find_checkpoint(self.objects.as_ref(), &job.bucket, &layout).await?;
            if let Some(key) = &checkpoint {
                info!("Resuming job {} after checkpoint {}", job.id, key);
            }
            checkpoint
        } else {
            None
        };

        let mut lister = ObjectLister::new(
            self.objects.clone(),
            &job.bucket,
            &job.prefix,
            self.config.eligibility_filter(&job.prefix),
            job.max_files,
        )
        .start_after(checkpoint);

        let max_workers = job.max_workers.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut listing_done = false;
        let mut fatal: Option<JobError> = None;

        loop {
            while !listing_done
                && fatal.is_none()
                && !cancel.is_cancelled()
                && in_flight.len() < max_workers
            {
                match lister.next_key().await {
                    Ok(Some(key)) => in_flight.push(self.process_object(job, &layout, key)),
                    Ok(None) => listing_done = true,
                    Err(e) => fatal = Some(e.into()),
                }
            }

            match in_flight.next().await {
                Some(Ok(outcome)) => tally.record(outcome),
                Some(Err(e)) => {
                    if fatal.is_none() {
                        error!("Job {} hit a fatal error, draining in-flight objects: {}", job.id, e);
                        fatal = Some(e);
                    } else {
                        warn!("Additional failure in job {}: {}", job.id, e);
                    }
                }
                None => break,
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fetch, summarize, parse and persist one object
    async fn process_object(
        &self,
        job: &Job,
        layout: &OutputLayout,
        key: String,
    ) -> Result<ObjectOutcome, JobError> {
        let output_key = layout.output_key(&key);

        if self.config.skip_existing {
            if let Some(record) = self.load_existing(&job.bucket, &key, &output_key).await {
                info!("Summary for {} already exists at {}, reusing it", key, output_key);
                self.jobs.merge_result(&job.id, &record).await?;
                return Ok(ObjectOutcome::Reused);
            }
        }

        let text = match self.fetcher.fetch_text(&job.bucket, &key).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Recording error entry for {}: {}", key, e);
                let record = placeholder(&key, SOURCE_ERROR, String::new(), e.to_string());
                self.jobs.merge_result(&job.id, &record).await?;
                return Ok(ObjectOutcome::Placeholder);
            }
        };

        let raw = self
            .summarizer
            .summarize(&key, &text)
            .await
            .map_err(|source| JobError::Summarization {
                key: key.clone(),
                source,
            })?;

        let mut record = parse_summary(&key, &raw);
        if let Err(e) = self.write_output(job, &output_key, &record).await {
            warn!("{}", e);
            record.output_error = Some(e);
        }
        self.jobs.merge_result(&job.id, &record).await?;

        info!("Summarized {} for job {}", key, job.id);
        Ok(ObjectOutcome::Summarized)
    }

    // === Output Location ===

    /// A previously written summary for `key`, if one exists and is readable
    async fn load_existing(&self, bucket: &str, key: &str, output_key: &str) -> Option<SummaryRecord> {
        match self.objects.head(bucket, output_key).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!("Could not check for existing summary {}: {:#}", output_key, e);
                return None;
            }
        }

        let bytes = match self.objects.get(bucket, output_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Existing summary {} could not be read: {}", output_key, e);
                return None;
            }
        };

        match serde_json::from_slice::<SummaryRecord>(&bytes) {
            Ok(mut record) => {
                record.key = key.to_string();
                Some(record)
            }
            Err(e) => {
                warn!("Existing summary {} is not a valid record, re-summarizing: {}", output_key, e);
                None
            }
        }
    }

    /// Store `record` as the summary output for its source key.
    ///
    /// A failure is returned as a message for the record; the object is
    /// summarized again by the next run.
    async fn write_output(&self, job: &Job, output_key: &str, record: &SummaryRecord) -> Result<(), String> {
        let body = serde_json::to_vec_pretty(record)
            .map_err(|e| format!("Failed to serialize summary for {}: {}", record.key, StoreError::from(e)))?;

        let metadata = HashMap::from([
            (SOURCE_KEY_METADATA.to_string(), record.key.clone()),
            (JOB_ID_METADATA.to_string(), job.id.clone()),
        ]);

        self.objects
            .put(&job.bucket, output_key, Bytes::from(body), "application/json", metadata)
            .await
            .map_err(|e| format!("Failed to write summary output s3://{}/{}: {:#}", job.bucket, output_key, e))
    }

    async fn upload_report(&self, job: &Job, status: &JobStatus, duration: Duration) -> Result<(), String> {
        let results = self
            .jobs
            .get_result(&job.id)
            .await
            .map_err(|e| format!("Skipping report for job {}: {}", job.id, e))?;

        let report = render_report(job, status, &results, duration);
        let report_key = self.config.output_layout(&job.prefix).report_key();

        self.objects
            .put(
                &job.bucket,
                &report_key,
                Bytes::from(report),
                "text/markdown",
                HashMap::from([(JOB_ID_METADATA.to_string(), job.id.clone())]),
            )
            .await
            .map_err(|e| format!("Failed to upload report s3://{}/{}: {:#}", job.bucket, report_key, e))?;

        info!("Uploaded report to s3://{}/{}", job.bucket, report_key);
        Ok(())
    }
}
