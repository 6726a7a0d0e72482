//! Upstream model provider abstraction.
//!
//! The relay only depends on [`ChatProvider`], so the Gemini backend can be
//! swapped for the scripted mock in tests.

pub mod gemini;
pub mod mock;

use crate::models::Message;
use crate::services::generation::GenerationConfig;
use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::NetworkError(_) => "network_error",
            ProviderError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// One candidate output inside a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    /// Text parts in order. Non-text parts are not represented.
    pub parts: Vec<String>,
}

/// One chunk of a streamed generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseChunk {
    pub candidates: Vec<Candidate>,
}

impl ResponseChunk {
    /// Chunk with a single candidate holding the given text parts.
    pub fn text<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: vec![Candidate {
                parts: parts.into_iter().map(Into::into).collect(),
            }],
        }
    }

    /// Every non-empty text part across every candidate, in order.
    pub fn into_fragments(self) -> impl Iterator<Item = String> {
        self.candidates
            .into_iter()
            .flat_map(|candidate| candidate.parts)
            .filter(|text| !text.is_empty())
    }
}

/// Type alias for provider streams.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<ResponseChunk, ProviderError>> + Send>>;

/// Trait for streaming chat providers (e.g., Gemini).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name used in metrics and logs.
    fn name(&self) -> &'static str;

    /// Open a streaming generation over the full message list.
    async fn generate_stream(
        &self,
        model: &str,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ProviderStream, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
