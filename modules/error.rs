//! Error taxonomy for the summarization pipeline.
//!
//! Object-level errors (`FetchError`, `DecodeError`) degrade to placeholder
//! records. Job-level errors (`ListingError`, `SummarizationError`, `StoreError`)
//! end the job as failed.

use std::fmt;

/// Listing the source prefix failed. Fatal to the job.
#[derive(Debug, thiserror::Error)]
#[error("failed to list s3://{bucket}/{prefix}: {message}")]
pub struct ListingError {
    pub bucket: String,
    pub prefix: String,
    pub message: String,
}

impl ListingError {
    pub fn new(bucket: &str, prefix: &str, cause: impl fmt::Display) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            message: format!("{cause:#}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NotFound,
    PermissionDenied,
    Transient,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::NotFound => write!(f, "not found"),
            FetchErrorKind::PermissionDenied => write!(f, "permission denied"),
            FetchErrorKind::Transient => write!(f, "transient failure"),
        }
    }
}

/// Reading a single object failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to fetch {key} ({kind}): {message}")]
pub struct FetchError {
    pub key: String,
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(key: &str, kind: FetchErrorKind, cause: impl fmt::Display) -> Self {
        Self {
            key: key.to_string(),
            kind,
            message: cause.to_string(),
        }
    }

    pub fn not_found(key: &str) -> Self {
        Self::new(key, FetchErrorKind::NotFound, "object does not exist")
    }
}

/// Object content is not valid UTF-8.
#[derive(Debug, thiserror::Error)]
#[error("{key} is not valid UTF-8: {source}")]
pub struct DecodeError {
    pub key: String,
    #[source]
    pub source: std::string::FromUtf8Error,
}

/// Every attempt at the remote summarization call failed.
///
/// Carries the cause of the final attempt, not the first.
#[derive(Debug, thiserror::Error)]
#[error("summarization failed after {attempts} attempts: {last_error:#}")]
pub struct SummarizationError {
    pub attempts: u32,
    pub last_error: anyhow::Error,
}

/// Job store backend failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("job store connection error: {0}")]
    Connection(String),
    #[error("job store command error: {0}")]
    Command(String),
    #[error("job store serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Failure that ends a job as `failed(reason)`.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error("{key}: {source}")]
    Summarization {
        key: String,
        #[source]
        source: SummarizationError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarization_error_reports_last_cause() {
        let err = SummarizationError {
            attempts: 5,
            last_error: anyhow::anyhow!("HTTP 503 on attempt 5"),
        };
        let job_err = JobError::Summarization {
            key: "docs/a.txt".to_string(),
            source: err,
        };

        let reason = job_err.to_string();
        assert!(reason.starts_with("docs/a.txt: summarization failed after 5 attempts"));
        assert!(reason.contains("HTTP 503 on attempt 5"));
    }

    #[test]
    fn test_listing_error_keeps_cause_chain() {
        let cause = anyhow::anyhow!("AccessDenied").context("list_objects_v2 failed");
        let err = ListingError::new("bucket", "docs/", cause);
        assert_eq!(
            err.to_string(),
            "failed to list s3://bucket/docs/: list_objects_v2 failed: AccessDenied"
        );
    }
}
