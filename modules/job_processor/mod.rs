//! Job processor module for batch summarization workflows
//!
//! This module provides the pipeline for:
//! - Listing eligible objects under a bucket/prefix
//! - Fetching, chunking and summarizing each object with bounded concurrency
//! - Persisting every object's summary as soon as it completes
//! - Tracking the job through its status lifecycle and writing a report

pub mod core;
pub mod markdown;
pub mod types;

// Re-export main types and structs
pub use self::core::JobProcessor;
pub use markdown::{render_report, MarkdownBuilder};
pub use types::{
    InvalidJob, Job, JobReport, JobStatus, ObjectOutcome, ResultSet, SummaryRecord,
};
