use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use super::{GenerationParams, SummaryModel};

pub const DEFAULT_ENDPOINT: &str = "https://api.together.xyz/inference";

/// HTTPS completion endpoint speaking the Together inference format
pub struct TogetherModel {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model_id: String,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    stream: bool,
}

impl TogetherModel {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model_id: model_id.into(),
        })
    }
}

#[async_trait]
impl SummaryModel for TogetherModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = InferenceRequest {
            model: &self.model_id,
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            repetition_penalty: params.repetition_penalty,
            stop: &params.stop,
            stream: false,
        };

        info!("Invoking model {} with {} character prompt", self.model_id, prompt.len());

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context(format!("Request to {} failed", self.endpoint))?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response body")?;
        if !status.is_success() {
            anyhow::bail!("{} returned {}: {}", self.endpoint, status, body);
        }

        let value: Value = serde_json::from_str(&body).context("Response body is not JSON")?;
        extract_choice_text(&value)
    }
}

fn extract_choice_text(value: &Value) -> Result<String> {
    value["output"]["choices"][0]["text"]
        .as_str()
        .or_else(|| value["choices"][0]["text"].as_str())
        .map(|text| text.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Unexpected response format: {}", value))
}
