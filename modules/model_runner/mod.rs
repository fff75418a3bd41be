//! Remote summarization model backends.

pub mod bedrock;
pub mod together;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use bedrock::BedrockModel;
pub use together::TogetherModel;

/// Sampling and length parameters sent with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: Option<u32>,
    pub repetition_penalty: Option<f32>,
    pub stop: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1500,
            temperature: 0.7,
            top_p: 0.95,
            top_k: Some(40),
            repetition_penalty: Some(1.1),
            stop: Vec::new(),
        }
    }
}

/// A stateless text-completion endpoint.
///
/// Any error (transport, non-2xx status, malformed body) is returned as-is;
/// retrying is the caller's concern.
#[async_trait]
pub trait SummaryModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String>;
}
