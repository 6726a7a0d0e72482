//! Mock provider implementation for testing.

use super::{ChatProvider, ProviderError, ProviderStream, ResponseChunk};
use crate::models::Message;
use crate::services::generation::GenerationConfig;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted event of a mock generation.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Yield this chunk.
    Chunk(ResponseChunk),
    /// Yield an upstream error.
    Fail(String),
    /// Never yield again, like an upstream that stopped responding.
    Stall,
}

/// Arguments of the most recent `generate_stream` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<Message>,
    pub config: GenerationConfig,
}

/// Mock chat provider that replays a fixed script.
pub struct MockChatProvider {
    steps: Vec<MockStep>,
    open_error: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    last_call: Mutex<Option<RecordedCall>>,
}

impl MockChatProvider {
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps,
            open_error: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_call: Mutex::new(None),
        }
    }

    /// Provider yielding one single-candidate chunk per fragment.
    pub fn with_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            fragments
                .into_iter()
                .map(|fragment| MockStep::Chunk(ResponseChunk::text([fragment])))
                .collect(),
        )
    }

    /// Provider whose stream cannot be opened at all.
    pub fn failing_on_open(message: impl Into<String>) -> Self {
        let mut provider = Self::new(Vec::new());
        provider.open_error = Some(message.into());
        provider
    }

    /// Wait this long before every scripted step.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of generations opened so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.last_call.lock().ok().and_then(|call| call.clone())
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate_stream(
        &self,
        model: &str,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ProviderStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last_call) = self.last_call.lock() {
            *last_call = Some(RecordedCall {
                model: model.to_string(),
                messages: messages.to_vec(),
                config: config.clone(),
            });
        }

        if let Some(message) = &self.open_error {
            return Err(ProviderError::ApiError(message.clone()));
        }

        let delay = self.delay;
        let stream = futures::stream::iter(self.steps.clone()).then(move |step| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match step {
                MockStep::Chunk(chunk) => Ok(chunk),
                MockStep::Fail(message) => Err(ProviderError::NetworkError(message)),
                MockStep::Stall => futures::future::pending().await,
            }
        });

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match &self.open_error {
            Some(message) => Err(ProviderError::NotConfigured(message.clone())),
            None => Ok(()),
        }
    }
}
