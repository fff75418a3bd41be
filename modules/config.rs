//! Worker configuration.
//!
//! Every tunable has a default here; the binary overlays command-line flags
//! and environment variables on top.

use anyhow::{Context, Result};
use aws_config::SdkConfig;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::file_discovery::{EligibilityFilter, OutputLayout, DEFAULT_EXTENSIONS};
use crate::job_store::DEFAULT_JOB_TTL;
use crate::model_runner::{
    together::DEFAULT_ENDPOINT, BedrockModel, GenerationParams, SummaryModel, TogetherModel,
};
use crate::retry::RetryPolicy;
use crate::summarizer::{
    SummarizerSettings, DEFAULT_CHUNK_CONCURRENCY, DEFAULT_MIN_TEXT_CHARS, DEFAULT_PROMPT_TEMPLATE,
};
use crate::text_splitter::{ChunkConfig, TextSplitter, DEFAULT_MAX_TOKENS};

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_OUTPUT_DIR: &str = "summaries";
pub const DEFAULT_MODEL_ID: &str = "meta-llama/Llama-3-70b-chat-hf";
pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_MAX_FILES: usize = 100;

/// Which remote summarization API to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Bedrock,
    Together,
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelProvider::Bedrock => write!(f, "bedrock"),
            ModelProvider::Together => write!(f, "together"),
        }
    }
}

impl FromStr for ModelProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bedrock" => Ok(ModelProvider::Bedrock),
            "together" => Ok(ModelProvider::Together),
            other => anyhow::bail!("unknown model provider '{}' (expected bedrock or together)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    /// Prefix of every job store key
    pub namespace: String,
    /// Lifetime of job-scoped data
    pub retention: Duration,
    pub dequeue_timeout: Duration,

    pub provider: ModelProvider,
    pub model_id: String,
    pub together_endpoint: String,
    pub together_api_key: Option<String>,
    pub request_timeout: Duration,
    pub params: GenerationParams,
    pub prompt_template: String,

    pub max_chunk_tokens: usize,
    pub min_text_chars: usize,
    /// Chunks of one object summarized concurrently
    pub chunk_concurrency: usize,

    pub retry_attempts: u32,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,

    /// Sub-directory of the job prefix holding summary outputs
    pub output_dir: String,
    /// Reuse summary outputs that already exist instead of re-summarizing
    pub skip_existing: bool,
    /// Start listing after the source key of the newest summary output
    pub resume_from_checkpoint: bool,
    pub extensions: Vec<String>,
    /// Object keys never processed
    pub deny_list: HashSet<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            namespace: crate::job_store::redis_store::DEFAULT_NAMESPACE.to_string(),
            retention: DEFAULT_JOB_TTL,
            dequeue_timeout: Duration::from_secs(5),
            provider: ModelProvider::Together,
            model_id: DEFAULT_MODEL_ID.to_string(),
            together_endpoint: DEFAULT_ENDPOINT.to_string(),
            together_api_key: None,
            request_timeout: Duration::from_secs(120),
            params: GenerationParams::default(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            max_chunk_tokens: DEFAULT_MAX_TOKENS,
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            chunk_concurrency: DEFAULT_CHUNK_CONCURRENCY,
            retry_attempts: 5,
            backoff_floor: Duration::from_secs(1),
            backoff_ceiling: Duration::from_secs(60),
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            skip_existing: true,
            resume_from_checkpoint: false,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            deny_list: HashSet::new(),
        }
    }
}

impl WorkerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            floor: self.backoff_floor,
            ceiling: self.backoff_ceiling,
            ..RetryPolicy::default()
        }
    }

    pub fn text_splitter(&self) -> TextSplitter {
        TextSplitter::with_config(ChunkConfig {
            max_tokens: self.max_chunk_tokens,
        })
    }

    pub fn summarizer_settings(&self) -> SummarizerSettings {
        SummarizerSettings {
            min_text_chars: self.min_text_chars,
            chunk_concurrency: self.chunk_concurrency,
            params: self.params.clone(),
            prompt_template: self.prompt_template.clone(),
        }
    }

    pub fn output_layout(&self, prefix: &str) -> OutputLayout {
        OutputLayout::new(prefix, &self.output_dir)
    }

    pub fn eligibility_filter(&self, prefix: &str) -> EligibilityFilter {
        EligibilityFilter::new(
            self.extensions.iter(),
            self.output_layout(prefix),
            self.deny_list.clone(),
        )
    }

    /// Construct the configured model backend
    pub fn build_model(&self, aws: &SdkConfig) -> Result<Arc<dyn SummaryModel>> {
        match self.provider {
            ModelProvider::Bedrock => {
                let client = Arc::new(BedrockClient::new(aws));
                Ok(Arc::new(BedrockModel::new(client, &self.model_id)))
            }
            ModelProvider::Together => {
                let api_key = self
                    .together_api_key
                    .clone()
                    .filter(|key| !key.trim().is_empty())
                    .context("Together API key is required for the together provider")?;
                let model = TogetherModel::new(
                    &self.together_endpoint,
                    api_key,
                    &self.model_id,
                    self.request_timeout,
                )?;
                Ok(Arc::new(model))
            }
        }
    }
}
