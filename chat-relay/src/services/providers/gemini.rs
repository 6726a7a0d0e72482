//! Gemini AI provider implementation.
//!
//! Streams `streamGenerateContent` over server-sent events and turns each
//! event into a [`ResponseChunk`].

use super::{Candidate, ChatProvider, ProviderError, ProviderStream, ResponseChunk};
use crate::models::Message;
use crate::services::generation::{GenerationConfig, Tool};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::observability::TracedClientExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    pub api_base: String,
    pub connect_timeout: Duration,
}

/// Gemini chat provider.
pub struct GeminiChatProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiChatProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        // Connect timeout only; the streamed body has no deadline.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.api_base.trim_end_matches('/'),
            model
        )
    }

    fn build_request(messages: &[Message], config: &GenerationConfig) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: messages
                .iter()
                .map(|message| Content {
                    role: Some(message.role.as_str().to_string()),
                    parts: vec![Part::text(&message.text)],
                })
                .collect(),
            generation_config: WireGenerationConfig {
                temperature: config.temperature,
                top_p: config.top_p,
                max_output_tokens: config.max_output_tokens,
                response_modalities: config
                    .response_modalities
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
            },
            safety_settings: config
                .safety_settings
                .iter()
                .map(|s| WireSafetySetting {
                    category: s.category.as_str().to_string(),
                    threshold: s.threshold.as_str().to_string(),
                })
                .collect(),
            tools: config
                .tools
                .iter()
                .map(|tool| match tool {
                    Tool::GoogleSearch => WireTool {
                        google_search: GoogleSearch {},
                    },
                })
                .collect(),
            system_instruction: Content {
                role: None,
                parts: vec![Part::text(&config.system_instruction)],
            },
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiChatProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate_stream(
        &self,
        model: &str,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ProviderStream, ProviderError> {
        let request = Self::build_request(messages, config);
        let url = self.stream_url(model);

        tracing::debug!(
            model = %model,
            message_count = messages.len(),
            tools = config.tools.len(),
            "Starting streaming request to Gemini API"
        );

        let response = self
            .client
            .traced_post(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            loop {
                // Stop reading from the network as soon as the consumer is gone.
                let next = tokio::select! {
                    _ = tx.closed() => return,
                    next = stream.next() => next,
                };

                let bytes = match next {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        let _ = tx
                            .send(Err(ProviderError::NetworkError(e.to_string())))
                            .await;
                        return;
                    }
                    None => break,
                };

                for data in decoder.push(&bytes) {
                    let item = parse_event(&data);
                    let failed = item.is_err();
                    if tx.send(item).await.is_err() || failed {
                        return;
                    }
                }
            }

            if let Some(data) = decoder.finish() {
                let _ = tx.send(parse_event(&data)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)) as ProviderStream)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }

        let url = format!("{}/models", self.config.api_base.trim_end_matches('/'));

        let response = self
            .client
            .traced_get(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }
}

/// Turn one SSE `data:` payload into a chunk.
fn parse_event(data: &str) -> Result<ResponseChunk, ProviderError> {
    let response: GenerateContentResponse = serde_json::from_str(data)
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse event: {}", e)))?;

    if let Some(error) = response.error {
        return Err(ProviderError::ApiError(format!(
            "{} {}: {}",
            error.code.unwrap_or_default(),
            error.status.unwrap_or_default(),
            error.message
        )));
    }

    Ok(ResponseChunk {
        candidates: response
            .candidates
            .into_iter()
            .map(|candidate| Candidate {
                parts: candidate
                    .content
                    .map(|content| content.parts)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect(),
            })
            .collect(),
    })
}

/// Incremental server-sent-events decoder.
///
/// Bytes are buffered until a blank line closes the event, so multi-byte
/// characters split across network reads are reassembled before decoding.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for an event boundary.
    scanned: usize,
}

impl SseDecoder {
    /// Feed bytes and return the data payload of every completed event.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer
            .extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        let mut consumed = 0;
        // Back up one byte so a boundary split across reads is still found.
        let mut from = self.scanned.saturating_sub(1);

        while let Some(offset) = self.buffer[from..].windows(2).position(|w| w == b"\n\n") {
            let end = from + offset;
            if let Some(data) = event_data(&self.buffer[consumed..end]) {
                events.push(data);
            }
            consumed = end + 2;
            from = consumed;
        }

        self.buffer.drain(..consumed);
        self.scanned = self.buffer.len();
        events
    }

    /// Payload of a trailing event the server did not terminate.
    fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buffer);
        event_data(&rest)
    }
}

fn event_data(event: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(event);
    let lines: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: WireGenerationConfig,
    safety_settings: Vec<WireSafetySetting>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    system_instruction: Content,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: i32,
    response_modalities: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WireSafetySetting {
    category: String,
    threshold: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<i32>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}
