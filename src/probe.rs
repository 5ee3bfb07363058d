use std::sync::Arc;
use std::time::Instant;

use crate::client::{ClientError, CompletionBackend};
use crate::prompt::PromptSource;
use crate::sample::{classify_error, ErrorKind, Outcome};

/// Issues one measurement against the completion capability. Two
/// network round trips per probe: the timed streaming completion, then
/// a non-streaming repeat of the same prompt for usage accounting
/// (streaming responses do not reliably carry prompt-token usage).
pub struct ProbeExecutor {
    backend: Arc<dyn CompletionBackend>,
    prompts: Box<dyn PromptSource>,
}

impl ProbeExecutor {
    pub fn new(backend: Arc<dyn CompletionBackend>, prompts: Box<dyn PromptSource>) -> Self {
        Self { backend, prompts }
    }

    /// Run one probe. Every failure from either round trip is caught
    /// here, stringified verbatim, and classified — the scheduler never
    /// sees a probe-level error.
    pub async fn run_probe(&mut self, model_id: &str) -> Outcome {
        let prompt = self.prompts.next_prompt();

        match self.measure(model_id, &prompt).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let detail = e.to_string();
                Outcome::Failure {
                    kind: classify_error(&detail),
                    detail,
                }
            }
        }
    }

    async fn measure(&self, model_id: &str, prompt: &str) -> Result<Outcome, ClientError> {
        let start = Instant::now();
        let mut stream = self.backend.stream_completion(model_id, prompt).await?;

        let mut first_token: Option<Instant> = None;
        let mut completion_tokens: u64 = 0;

        while let Some(chunk) = stream.next_chunk().await? {
            for choice in &chunk.choices {
                let Some(content) = choice.delta.content.as_deref() else {
                    continue;
                };
                if content.is_empty() {
                    continue;
                }
                if first_token.is_none() {
                    first_token = Some(Instant::now());
                }
                // Whitespace word count, not a tokenizer count.
                completion_tokens += content.split_whitespace().count() as u64;
            }
        }
        let end = Instant::now();

        // A stream that completed without any content is a failure, not
        // a zero-throughput success.
        let Some(first) = first_token else {
            return Ok(Outcome::Failure {
                kind: ErrorKind::NoTokenProduced,
                detail: "NoTokenProduced: stream completed without a content chunk".into(),
            });
        };

        let usage = self.backend.completion_usage(model_id, prompt).await?;

        let total_latency_ms = (end - start).as_secs_f64() * 1000.0;
        let first_token_latency_ms = (first - start).as_secs_f64() * 1000.0;
        let generation_secs = (end - first).as_secs_f64();
        let tokens_per_second = if generation_secs > 0.0 {
            completion_tokens as f64 / generation_secs
        } else {
            0.0
        };

        Ok(Outcome::Success {
            first_token_latency_ms,
            total_latency_ms,
            tokens_per_second,
            completion_tokens,
            prompt_tokens: usage.prompt_tokens,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────
