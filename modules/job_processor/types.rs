//! Types and data structures for the job processor module

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// One request to summarize up to `max_files` eligible objects under a bucket/prefix
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    pub max_files: usize,
    pub max_workers: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidJob {
    #[error("bucket must not be empty")]
    EmptyBucket,
    #[error("max_files must be positive")]
    ZeroMaxFiles,
    #[error("max_workers must be positive")]
    ZeroMaxWorkers,
}

impl Job {
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        max_files: usize,
        max_workers: usize,
    ) -> Result<Self, InvalidJob> {
        let job = Self {
            id: Uuid::new_v4().to_string(),
            bucket: bucket.into(),
            prefix: prefix.into(),
            max_files,
            max_workers,
            created_at: Utc::now(),
        };
        job.validate()?;
        Ok(job)
    }

    pub fn validate(&self) -> Result<(), InvalidJob> {
        if self.bucket.trim().is_empty() {
            return Err(InvalidJob::EmptyBucket);
        }
        if self.max_files == 0 {
            return Err(InvalidJob::ZeroMaxFiles);
        }
        if self.max_workers == 0 {
            return Err(InvalidJob::ZeroMaxWorkers);
        }
        Ok(())
    }
}

/// Lifecycle of a job: queued → running → {completed | failed | stopped}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed { reason: String },
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed { .. } | JobStatus::Stopped
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed { reason } => write!(f, "failed: {}", reason),
            JobStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Structured summary of one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub key: String,
    /// Every known section name maps to content or a marker
    pub sections: BTreeMap<String, String>,
    /// `Section: content` lines for all sections
    pub full_text: String,
    /// Model output as received, before parsing
    pub raw_output: String,
    /// Set on placeholder records for objects that could not be summarized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the summary output object could not be written, if it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_error: Option<String>,
}

impl SummaryRecord {
    pub fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }

    /// Whether this record may replace `existing` in a result set.
    ///
    /// Only a real summary may replace an error placeholder.
    pub fn supersedes(&self, existing: &SummaryRecord) -> bool {
        existing.is_placeholder() && !self.is_placeholder()
    }
}

/// Accumulated object key → summary mapping for one job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet(BTreeMap<String, SummaryRecord>);

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record unless it would replace better data. Returns whether it was stored.
    pub fn merge(&mut self, record: SummaryRecord) -> bool {
        match self.0.get(&record.key) {
            Some(existing) if !record.supersedes(existing) => false,
            _ => {
                self.0.insert(record.key.clone(), record);
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&SummaryRecord> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SummaryRecord)> {
        self.0.iter()
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &SummaryRecord> {
        self.0.values().filter(|r| r.is_placeholder())
    }
}

impl FromIterator<SummaryRecord> for ResultSet {
    fn from_iter<I: IntoIterator<Item = SummaryRecord>>(iter: I) -> Self {
        let mut set = ResultSet::new();
        for record in iter {
            set.merge(record);
        }
        set
    }
}

/// How one object was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOutcome {
    Summarized,
    /// A summary output already existed and was reused
    Reused,
    /// Fetch or decode failed; a placeholder was recorded
    Placeholder,
}

/// Outcome of a whole job run
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub status: JobStatus,
    pub summarized: usize,
    pub reused: usize,
    pub placeholders: usize,
    pub duration: Duration,
    /// Job-level bookkeeping that failed without changing the outcome
    pub warnings: Vec<String>,
}

impl JobReport {
    pub fn processed(&self) -> usize {
        self.summarized + self.reused + self.placeholders
    }
}
