/// LLM Client — the single point of entry for all model calls in the interview service.
///
/// ARCHITECTURAL RULE: the interview engine never calls the Anthropic API directly.
/// It consumes generation only through the [`StreamingTextSource`] trait, which
/// `LlmClient` implements and tests replace with a scripted source.
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;
mod sse;
#[cfg(test)]
pub mod testing;

use sse::{parse_stream_event, SseDecoder, StreamEvent};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Model used when `INTERVIEW_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Stream error: {0}")]
    Stream(String),
}

/// Identifier of the generation model, passed through to the provider verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { temperature: 0.7 }
    }
}

/// Receives streamed text fragments. The fragment lifetime is spelled out as
/// higher-ranked because `#[async_trait]` would otherwise pin it to one call.
pub type ChunkSink<'s> = dyn for<'a> FnMut(&'a str) + Send + 's;

/// Narrow streaming contract consumed by the interview engine.
///
/// Implementations call `on_chunk` zero or more times with non-overlapping
/// fragments whose concatenation is the full response, then return `Ok(())`.
/// Transport failures come back as `Err`; they must never panic.
#[async_trait]
pub trait StreamingTextSource: Send + Sync {
    async fn generate_streaming(
        &self,
        prompt: &str,
        system: &str,
        model: &ModelId,
        on_chunk: &mut ChunkSink<'_>,
        options: GenerationOptions,
    ) -> Result<(), LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    temperature: f32,
    stream: bool,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicError {
    pub(crate) error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicErrorBody {
    pub(crate) message: String,
}

/// The single streaming client used by the interview service.
/// Wraps the Anthropic Messages API (server-sent events) with retry logic.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            api_key,
        })
    }

    /// Opens a streaming call and forwards every text delta to `on_chunk`.
    ///
    /// Retries on connect failures, 429 and 5xx with exponential backoff. Retries
    /// only happen before the response body is read, so no chunk is ever replayed.
    async fn stream(
        &self,
        prompt: &str,
        system: &str,
        model: &ModelId,
        on_chunk: &mut ChunkSink<'_>,
        options: GenerationOptions,
    ) -> Result<(), LlmError> {
        let request_body = AnthropicRequest {
            model: model.as_str(),
            max_tokens: MAX_TOKENS,
            system,
            temperature: options.temperature,
            stream: true,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM stream attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return consume_event_stream(response, on_chunk).await;
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl StreamingTextSource for LlmClient {
    async fn generate_streaming(
        &self,
        prompt: &str,
        system: &str,
        model: &ModelId,
        on_chunk: &mut ChunkSink<'_>,
        options: GenerationOptions,
    ) -> Result<(), LlmError> {
        self.stream(prompt, system, model, on_chunk, options).await
    }
}

/// Reads the SSE body to completion, forwarding text deltas as they arrive.
async fn consume_event_stream(
    response: reqwest::Response,
    on_chunk: &mut ChunkSink<'_>,
) -> Result<(), LlmError> {
    let mut decoder = SseDecoder::default();
    let mut body = response.bytes_stream();
    let mut delivered = 0usize;

    while let Some(frame) = body.next().await {
        let frame: Bytes = frame?;
        for event in decoder.push(&frame) {
            match parse_stream_event(&event) {
                StreamEvent::Text(text) => {
                    delivered += text.len();
                    on_chunk(&text);
                }
                StreamEvent::Stop => {
                    debug!("LLM stream finished: {} bytes delivered", delivered);
                    return Ok(());
                }
                StreamEvent::Error(message) => return Err(LlmError::Stream(message)),
                StreamEvent::Ignored => {}
            }
        }
    }

    debug!(
        "LLM stream closed without message_stop: {} bytes delivered",
        delivered
    );
    Ok(())
}
