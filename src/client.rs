use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Whole-request ceiling. Generous because a probe can stream a long
/// completion off a million-character prompt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

// ─── Errors ──────────────────────────────────────────────────────

/// Failures surfaced by the completion capability. The `Display` text
/// is what the probe executor stringifies and feeds to the substring
/// classifier, so the variants spell out the markers the rules match.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Backend answered with a non-success status.
    #[error("APIError: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Backend rejected the prompt as larger than the model's window.
    #[error("ContextWindowExceeded: {0}")]
    ContextWindow(String),

    /// Connection-level failure; classifies as `Other`.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not match the expected wire shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

// ─── Wire shapes ─────────────────────────────────────────────────
// Two explicit tagged shapes, matched exhaustively: `StreamChunk` for
// streaming deltas and `CompletionResult` for the non-streaming call.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    /// Some backends attach usage to a streaming chunk; the probe's
    /// accounting uses the non-streaming call instead (see probe.rs).
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResult {
    pub usage: Usage,
}

// ─── Capability traits ───────────────────────────────────────────

/// The remote text-generation service, reduced to the two calls the
/// probe needs. Production uses `ChatClient`; tests script a fake.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Issue a streaming completion and hand back a pull iterator over
    /// its chunks.
    async fn stream_completion(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<Box<dyn ChunkStream>, ClientError>;

    /// Non-streaming round trip for usage accounting.
    async fn completion_usage(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<Usage, ClientError>;
}

#[async_trait]
pub trait ChunkStream: Send {
    /// Next parsed chunk, or `None` once the stream is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<StreamChunk>, ClientError>;
}

// ─── HTTP client ─────────────────────────────────────────────────

/// reqwest-backed client for an OpenAI-compatible chat endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post_completion(
        &self,
        model: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": stream,
        });

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http_failure(status.as_u16(), body));
        }

        Ok(response)
    }
}

/// Map a non-success HTTP answer onto the error taxonomy. Overflow is
/// recognized from the body text, anything else is an API error.
fn http_failure(status: u16, body: String) -> ClientError {
    if body.contains("context length") || body.contains("maximum context") {
        ClientError::ContextWindow(body)
    } else {
        ClientError::Api { status, body }
    }
}

#[async_trait]
impl CompletionBackend for ChatClient {
    async fn stream_completion(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<Box<dyn ChunkStream>, ClientError> {
        let response = self.post_completion(model, prompt, true).await?;
        Ok(Box::new(SseStream {
            response,
            buf: String::new(),
            done: false,
        }))
    }

    async fn completion_usage(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<Usage, ClientError> {
        let response = self.post_completion(model, prompt, false).await?;
        let result: CompletionResult = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(result.usage)
    }
}

// ─── SSE framing ─────────────────────────────────────────────────

/// One decoded server-sent event line.
#[derive(Debug)]
enum SseEvent {
    Chunk(StreamChunk),
    Done,
}

/// Decode a single SSE line. Blank lines and comment/other fields
/// yield `None`; `data:` payloads are either the `[DONE]` sentinel or
/// a JSON `StreamChunk`.
fn decode_sse_line(line: &str) -> Result<Option<SseEvent>, ClientError> {
    let line = line.trim();
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim_start();

    if payload == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| ClientError::Decode(format!("bad stream chunk: {e}")))?;
    Ok(Some(SseEvent::Chunk(chunk)))
}

/// Pull-based reader over the streaming response body: buffers bytes,
/// re-frames them into lines, yields parsed chunks.
struct SseStream {
    response: reqwest::Response,
    buf: String,
    done: bool,
}

#[async_trait]
impl ChunkStream for SseStream {
    async fn next_chunk(&mut self) -> Result<Option<StreamChunk>, ClientError> {
        loop {
            if self.done {
                return Ok(None);
            }

            // Drain complete lines already buffered.
            while let Some(pos) = self.buf.find('\n') {
                let line: String = self.buf.drain(..=pos).collect();
                match decode_sse_line(&line)? {
                    Some(SseEvent::Chunk(chunk)) => return Ok(Some(chunk)),
                    Some(SseEvent::Done) => {
                        self.done = true;
                        return Ok(None);
                    }
                    None => continue,
                }
            }

            // Need more bytes from the wire.
            match self.response.chunk().await? {
                Some(bytes) => self.buf.push_str(&String::from_utf8_lossy(&bytes)),
                None => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_content_chunk() {
        let line = r#"data: {"choices":[{"delta":{"content":"hello world"}}]}"#;
        let event = decode_sse_line(line).unwrap().unwrap();
        match event {
            SseEvent::Chunk(chunk) => {
                assert_eq!(
                    chunk.choices[0].delta.content.as_deref(),
                    Some("hello world")
                );
                assert!(chunk.usage.is_none());
            }
            SseEvent::Done => panic!("expected chunk"),
        }
    }

    #[test]
    fn decodes_usage_bearing_chunk() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":120,"completion_tokens":48,"total_tokens":168}}"#;
        let event = decode_sse_line(line).unwrap().unwrap();
        match event {
            SseEvent::Chunk(chunk) => {
                let usage = chunk.usage.unwrap();
                assert_eq!(usage.prompt_tokens, 120);
                assert_eq!(usage.completion_tokens, 48);
            }
            SseEvent::Done => panic!("expected chunk"),
        }
    }

    #[test]
    fn decodes_done_sentinel() {
        assert!(matches!(
            decode_sse_line("data: [DONE]").unwrap(),
            Some(SseEvent::Done)
        ));
    }

    #[test]
    fn skips_blank_and_non_data_lines() {
        assert!(decode_sse_line("").unwrap().is_none());
        assert!(decode_sse_line(": keep-alive").unwrap().is_none());
        assert!(decode_sse_line("event: ping").unwrap().is_none());
    }

    #[test]
    fn rejects_malformed_chunk_json() {
        assert!(decode_sse_line("data: {not json").is_err());
    }

    #[test]
    fn http_failure_maps_overflow_to_context_window() {
        let err = http_failure(
            400,
            "This model's maximum context length is 65536 tokens".into(),
        );
        assert!(matches!(err, ClientError::ContextWindow(_)));

        let err = http_failure(503, "server overloaded".into());
        assert!(matches!(err, ClientError::Api { status: 503, .. }));
    }

    #[test]
    fn non_streaming_result_parses_usage() {
        let json = r#"{"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let result: CompletionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.usage.total_tokens, 15);
    }
}
