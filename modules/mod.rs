//! Library for batch summarization of object-store text files
//!
//! This library provides modules for:
//! - Object discovery, fetching and S3 operations
//! - Sentence-aware, token-bounded text splitting
//! - Model runners for Bedrock and HTTPS completion endpoints
//! - Summary parsing into a fixed section schema
//! - Job store backends and the job processor that orchestrates the workflow

pub mod config;
pub mod error;
pub mod file_discovery;
pub mod job_processor;
pub mod job_store;
pub mod logging;
pub mod model_runner;
pub mod object_fetcher;
pub mod object_store;
pub mod retry;
pub mod summarizer;
pub mod summary_parser;
pub mod text_splitter;
pub mod worker;

// Re-export commonly used types and structs
pub use config::{ModelProvider, WorkerConfig};
pub use error::{
    DecodeError, FetchError, FetchErrorKind, JobError, ListingError, StoreError, SummarizationError,
};
pub use file_discovery::{EligibilityFilter, ObjectLister, OutputLayout};
pub use job_processor::{
    Job, JobProcessor, JobReport, JobStatus, ResultSet, SummaryRecord,
};
pub use job_store::{InMemoryJobStore, JobStore, RedisJobStore};
pub use model_runner::{BedrockModel, GenerationParams, SummaryModel, TogetherModel};
pub use object_fetcher::ObjectFetcher;
pub use object_store::{InMemoryObjectStore, ObjectStore, ObjectSummary, S3ObjectStore};
pub use retry::RetryPolicy;
pub use summarizer::Summarizer;
pub use text_splitter::{Chunk, ChunkConfig, TextSplitter};
pub use worker::{handle_shutdown, ActiveJob, Worker};
