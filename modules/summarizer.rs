//! Summarizer client: prompt rendering, chunk fan-out with retries and
//! in-order reassembly of chunk summaries.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::error::SummarizationError;
use crate::model_runner::{GenerationParams, SummaryModel};
use crate::retry::RetryPolicy;
use crate::summary_parser::too_short_marker;
use crate::text_splitter::TextSplitter;

pub const DEFAULT_MIN_TEXT_CHARS: usize = 50;
pub const DEFAULT_CHUNK_CONCURRENCY: usize = 4;

/// Placed between chunk summaries of one object
pub const CHUNK_DELIMITER: &str = "\n\n";

/// Placeholder replaced by the chunk text in the prompt template
pub const TEXT_PLACEHOLDER: &str = "{text}";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "The following text is a court decision. \
Summarize it using exactly these section headings, each on its own line:\n\n\
Case Subject: [the subject of the case and the core of the dispute between the parties]\n\
Legal Basis: [the statutes, articles and precedents the decision relies on]\n\
Court Decision: [the final ruling]\n\
Reasoning: [the court's reasoning and the assessments behind the ruling]\n\n\
Keep every heading exactly as written. Mention important legal terms and statute numbers. \
Be brief but keep the critical information. Do not add any other sections.\n\n\
Decision text:\n{text}\n\nSummary:";

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    /// Texts shorter than this (in characters) are not sent to the model
    pub min_text_chars: usize,
    /// Chunks of one object summarized concurrently
    pub chunk_concurrency: usize,
    pub params: GenerationParams,
    pub prompt_template: String,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            chunk_concurrency: DEFAULT_CHUNK_CONCURRENCY,
            params: GenerationParams::default(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

pub struct Summarizer {
    model: Arc<dyn SummaryModel>,
    splitter: TextSplitter,
    retry: RetryPolicy,
    settings: SummarizerSettings,
}

impl Summarizer {
    pub fn new(
        model: Arc<dyn SummaryModel>,
        splitter: TextSplitter,
        retry: RetryPolicy,
        settings: SummarizerSettings,
    ) -> Self {
        Self {
            model,
            splitter,
            retry,
            settings,
        }
    }

    pub fn render_prompt(&self, text: &str) -> String {
        self.settings.prompt_template.replace(TEXT_PLACEHOLDER, text)
    }

    /// Summarize one object's text.
    ///
    /// Returns a string for model output, or the structured "too short"
    /// marker when the text is below the minimum length.
    pub async fn summarize(&self, key: &str, text: &str) -> Result<Value, SummarizationError> {
        if text.trim().chars().count() < self.settings.min_text_chars {
            info!("Text for {} is too short to summarize ({} chars)", key, text.len());
            return Ok(too_short_marker());
        }

        let chunks = self.splitter.split(text);
        if chunks.len() > 1 {
            info!(
                "Split {} into {} chunks (max {} tokens each)",
                key,
                chunks.len(),
                self.splitter.config().max_tokens
            );
        }

        let mut summaries: Vec<(usize, String)> = stream::iter(chunks)
            .map(|chunk| async move {
                self.summarize_chunk(key, chunk.chunk_id, &chunk.text)
                    .await
                    .map(|summary| (chunk.chunk_id, summary))
            })
            .buffer_unordered(self.settings.chunk_concurrency.max(1))
            .try_collect()
            .await?;

        // Completion order is arbitrary; restore chunk order
        summaries.sort_by_key(|(chunk_id, _)| *chunk_id);

        let combined = summaries
            .into_iter()
            .map(|(_, summary)| summary)
            .collect::<Vec<_>>()
            .join(CHUNK_DELIMITER);

        Ok(Value::String(combined))
    }

    /// Summarize a single chunk, retrying per the configured policy
    pub async fn summarize_chunk(
        &self,
        key: &str,
        chunk_id: usize,
        text: &str,
    ) -> Result<String, SummarizationError> {
        let prompt = self.render_prompt(text);
        let label = format!("summarize {} chunk {}", key, chunk_id);

        self.retry
            .run(&label, |_| self.model.complete(&prompt, &self.settings.params))
            .await
            .map_err(|exhausted| SummarizationError {
                attempts: exhausted.attempts,
                last_error: exhausted.last_error,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary_parser::TEXT_TOO_SHORT;
    use crate::text_splitter::ChunkConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes the chunk text back, delaying chunks by their first letter
    struct DelayedEcho {
        delays: Vec<(&'static str, u64)>,
        completions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SummaryModel for DelayedEcho {
        fn model_id(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str, _params: &GenerationParams) -> anyhow::Result<String> {
            let (name, delay) = self
                .delays
                .iter()
                .find(|(name, _)| prompt.contains(name))
                .copied()
                .ok_or_else(|| anyhow::anyhow!("unexpected prompt"))?;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.completions.lock().unwrap().push(name.to_string());
            Ok(format!("summary({})", name))
        }
    }

    struct AlwaysFails {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SummaryModel for AlwaysFails {
        fn model_id(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _prompt: &str, _params: &GenerationParams) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            anyhow::bail!("HTTP 503 on call {}", n)
        }
    }

    fn summarizer(model: Arc<dyn SummaryModel>, max_tokens: usize) -> Summarizer {
        Summarizer::new(
            model,
            TextSplitter::with_config(ChunkConfig { max_tokens }),
            RetryPolicy::immediate(5),
            SummarizerSettings {
                prompt_template: "{text}".to_string(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_chunk_summaries_keep_chunk_order() {
        // Three sentences of 24 chars each; a 6-token ceiling gives one chunk per sentence
        let text = "AAAAAAAAAAAAAAAAAAAAAA. BBBBBBBBBBBBBBBBBBBBBB. CCCCCCCCCCCCCCCCCCCCCC. ";
        let model = Arc::new(DelayedEcho {
            delays: vec![("AAAA", 40), ("BBBB", 80), ("CCCC", 0)],
            completions: Mutex::new(Vec::new()),
        });

        let result = summarizer(model.clone(), 6).summarize("doc.txt", text).await.unwrap();

        assert_eq!(*model.completions.lock().unwrap(), vec!["CCCC", "AAAA", "BBBB"]);
        assert_eq!(
            result,
            Value::String("summary(AAAA)\n\nsummary(BBBB)\n\nsummary(CCCC)".to_string())
        );
    }

    #[tokio::test]
    async fn test_short_text_skips_model() {
        let model = Arc::new(AlwaysFails {
            calls: AtomicU32::new(0),
        });
        let result = summarizer(model.clone(), 8000).summarize("tiny.txt", "Too short.").await.unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result["Case Subject"], TEXT_TOO_SHORT);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_last_cause() {
        let model = Arc::new(AlwaysFails {
            calls: AtomicU32::new(0),
        });
        let text = "A sufficiently long decision text that must be sent to the remote model.";
        let err = summarizer(model.clone(), 8000).summarize("doc.txt", text).await.unwrap_err();

        assert_eq!(model.calls.load(Ordering::SeqCst), 5);
        assert_eq!(err.attempts, 5);
        assert!(err.to_string().contains("HTTP 503 on call 5"));
        assert!(!err.to_string().contains("call 1"));
    }

    #[test]
    fn test_prompt_embeds_text() {
        let model = Arc::new(AlwaysFails {
            calls: AtomicU32::new(0),
        });
        let summarizer = Summarizer::new(
            model,
            TextSplitter::new(),
            RetryPolicy::default(),
            SummarizerSettings::default(),
        );
        let prompt = summarizer.render_prompt("THE DECISION");
        assert!(prompt.contains("Decision text:\nTHE DECISION\n\nSummary:"));
        assert!(prompt.contains("Case Subject:"));
    }
}
