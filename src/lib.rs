//! # Batch Summarizer
//!
//! Submits batches of text objects stored in S3 to a remote language model for
//! summarization, tracking progress and persisting results per job:
//! - Object discovery with resumable pagination and an eligibility filter
//! - Token-bounded text chunking at sentence boundaries
//! - Model invocation (Bedrock or a Together-style HTTPS endpoint) with retry and backoff
//! - Parsing of free-text model output into a fixed section schema
//! - A bounded worker pool per job with incremental, atomic result persistence
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use batch_summarizer::{
//!     InMemoryJobStore, Job, JobProcessor, JobStore, S3ObjectStore, WorkerConfig,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let aws = aws_config::load_from_env().await;
//!     let config = WorkerConfig::default();
//!
//!     let objects = Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&aws)));
//!     let jobs = Arc::new(InMemoryJobStore::new());
//!     let model = config.build_model(&aws)?;
//!
//!     let processor = JobProcessor::new(objects, jobs.clone(), model, &config);
//!     let job = Job::new("my-bucket", "decisions/", 20, 4)?;
//!     let report = processor.run(&job, &CancellationToken::new()).await;
//!
//!     println!("{} finished as {:?}", job.id, report.status);
//!     println!("{} objects in result set", jobs.get_result(&job.id).await?.len());
//!     Ok(())
//! }
//! ```

// Include the modules from the modules directory
#[path = "../modules/mod.rs"]
pub mod modules;

pub use modules::*;

pub use anyhow::{Context, Result};
pub use tokio;
pub use tracing;

/// Version information for the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library information
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
