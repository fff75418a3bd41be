use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::{primitives::Blob, Client as BedrockClient};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::{GenerationParams, SummaryModel};

/// Amazon Bedrock `invoke_model` backend
pub struct BedrockModel {
    bedrock_client: Arc<BedrockClient>,
    model_id: String,
}

impl BedrockModel {
    pub fn new(bedrock_client: Arc<BedrockClient>, model_id: impl Into<String>) -> Self {
        Self {
            bedrock_client,
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl SummaryModel for BedrockModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request_body = build_request_body(&self.model_id, prompt, params);
        info!("Invoking model {} with {} character prompt", self.model_id, prompt.len());

        let response = self
            .bedrock_client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(request_body.to_string().into_bytes()))
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to invoke Bedrock model {}: {}",
                    self.model_id,
                    aws_sdk_bedrockruntime::error::DisplayErrorContext(&e)
                )
            })?;

        let response_body: Value = serde_json::from_slice(response.body().as_ref())
            .context("Failed to parse Bedrock response")?;
        debug!("Bedrock response for model {}: {}", self.model_id, response_body);

        extract_output(&self.model_id, &response_body)
    }
}

/// Build request body based on model family
fn build_request_body(model_id: &str, prompt: &str, params: &GenerationParams) -> Value {
    match model_id {
        id if id.starts_with("amazon.nova") => {
            json!({
                "messages": [
                    { "role": "user", "content": [{ "text": prompt }] }
                ],
                "inferenceConfig": {
                    "max_new_tokens": params.max_tokens,
                    "temperature": params.temperature,
                    "top_p": params.top_p,
                    "stopSequences": params.stop,
                }
            })
        }
        id if id.starts_with("anthropic.claude-3") => {
            json!({
                "anthropic_version": "bedrock-2023-05-31",
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "stop_sequences": params.stop,
                "messages": [{ "role": "user", "content": prompt }]
            })
        }
        id if id.starts_with("mistral.") => {
            json!({
                "prompt": prompt,
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "stop": params.stop,
            })
        }
        id if id.starts_with("meta.llama") => {
            json!({
                "prompt": prompt,
                "max_gen_len": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
            })
        }
        // Legacy Claude text-completion format
        id if id.starts_with("anthropic.claude") => {
            json!({
                "prompt": format!("\n\nHuman: {}\n\nAssistant:", prompt),
                "max_tokens_to_sample": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
            })
        }
        id if id.starts_with("amazon.titan") => {
            json!({
                "inputText": prompt,
                "textGenerationConfig": {
                    "maxTokenCount": params.max_tokens,
                    "temperature": params.temperature,
                    "topP": params.top_p,
                    "stopSequences": params.stop,
                }
            })
        }
        _ => {
            json!({
                "prompt": prompt,
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
            })
        }
    }
}

/// Extract generated text based on model family
fn extract_output(model_id: &str, response_body: &Value) -> Result<String> {
    let output = match model_id {
        id if id.starts_with("amazon.nova") => {
            response_body["output"]["message"]["content"][0]["text"].as_str()
        }
        id if id.starts_with("anthropic.claude-3") => response_body["content"][0]["text"].as_str(),
        id if id.starts_with("mistral.") => response_body["outputs"][0]["text"].as_str(),
        id if id.starts_with("meta.llama") => response_body["generation"].as_str(),
        id if id.starts_with("anthropic.claude") => response_body["completion"].as_str(),
        id if id.starts_with("amazon.titan") => response_body["results"][0]["outputText"].as_str(),
        // Try the common response shapes in turn
        _ => response_body["completion"]
            .as_str()
            .or_else(|| response_body["text"].as_str())
            .or_else(|| response_body["outputs"][0]["text"].as_str())
            .or_else(|| response_body["content"][0]["text"].as_str())
            .or_else(|| response_body["generation"].as_str())
            .or_else(|| response_body["results"][0]["outputText"].as_str()),
    };

    output
        .map(|text| text.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Unexpected response format from {}: {}", model_id, response_body))
}
