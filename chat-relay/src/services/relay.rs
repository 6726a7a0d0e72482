//! Streaming relay between the upstream provider and an HTTP response body.
//!
//! A spawned producer pulls chunks from the provider and pushes text
//! fragments into a bounded channel. The response body drains the channel.
//! Once the generation's token is cancelled nothing more is sent, no
//! completion marker is emitted, and the body ends even if fragments are
//! still queued.

use crate::models::Message;
use crate::services::generation::GenerationConfig;
use crate::services::metrics;
use crate::services::providers::{ChatProvider, ProviderError};
use crate::services::state::GenerationHandle;
use axum::body::Bytes;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Prefix of the inline fragment reporting an upstream fault.
pub const ERROR_PREFIX: &str = "Error during generation:";

/// Capacity of the producer/consumer channel.
pub const FRAGMENT_CHANNEL_CAPACITY: usize = 32;

/// Unit of relay output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Text produced by the model.
    Text(String),
    /// Normal end of the generation. Renders as an empty write.
    Complete,
    /// Upstream fault description. Always the last fragment.
    Failed(String),
}

impl Fragment {
    /// Wire rendering. Faults are reported in-band as plain text.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Fragment::Text(text) => Bytes::from(text),
            Fragment::Complete => Bytes::new(),
            Fragment::Failed(description) => {
                Bytes::from(format!("{} {}", ERROR_PREFIX, description))
            }
        }
    }
}

/// How a relay run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    Cancelled,
    Failed,
    /// The response body was dropped before the generation ended.
    Disconnected,
}

impl RelayOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayOutcome::Completed => "completed",
            RelayOutcome::Cancelled => "cancelled",
            RelayOutcome::Failed => "failed",
            RelayOutcome::Disconnected => "disconnected",
        }
    }
}

/// Inputs of one upstream generation.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub config: GenerationConfig,
}

/// Start the producer task and return the fragment stream it feeds.
///
/// The handle is held by the task, so the generation stays registered
/// (and cancellable) until the producer finishes.
pub fn spawn_relay(
    provider: Arc<dyn ChatProvider>,
    request: RelayRequest,
    handle: GenerationHandle,
) -> ReceiverStream<Fragment> {
    let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
    let span = tracing::info_span!(
        "relay",
        generation_id = %handle.id(),
        model = %request.model,
        provider = provider.name(),
    );

    tokio::spawn(
        async move {
            let started = Instant::now();
            let model = request.model.clone();
            metrics::inc_in_flight();

            let outcome = run_relay(provider.as_ref(), request, handle.token(), &tx).await;

            metrics::dec_in_flight();
            metrics::record_generation(
                &model,
                outcome.as_str(),
                started.elapsed().as_secs_f64(),
            );
            tracing::info!(
                outcome = outcome.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Generation finished"
            );
            drop(handle);
        }
        .instrument(span),
    );

    ReceiverStream::new(rx)
}

/// Pump one generation into `tx` until it completes, fails or is cancelled.
pub async fn run_relay(
    provider: &dyn ChatProvider,
    request: RelayRequest,
    token: &CancellationToken,
    tx: &mpsc::Sender<Fragment>,
) -> RelayOutcome {
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return RelayOutcome::Cancelled,
        opened = provider.generate_stream(&request.model, &request.messages, &request.config) => opened,
    };

    let mut upstream = match opened {
        Ok(stream) => stream,
        Err(e) => return fail(provider, token, tx, e).await,
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return RelayOutcome::Cancelled,
            _ = tx.closed() => return RelayOutcome::Disconnected,
            next = upstream.next() => next,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return fail(provider, token, tx, e).await,
            None => break,
        };

        for text in chunk.into_fragments() {
            if let Err(outcome) = emit(token, tx, Fragment::Text(text)).await {
                return outcome;
            }
            metrics::record_fragment();
        }
    }

    match emit(token, tx, Fragment::Complete).await {
        Ok(()) => RelayOutcome::Completed,
        Err(outcome) => outcome,
    }
}

/// Send one fragment unless the generation was cancelled first.
async fn emit(
    token: &CancellationToken,
    tx: &mpsc::Sender<Fragment>,
    fragment: Fragment,
) -> Result<(), RelayOutcome> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RelayOutcome::Cancelled),
        sent = tx.send(fragment) => sent.map_err(|_| RelayOutcome::Disconnected),
    }
}

async fn fail(
    provider: &dyn ChatProvider,
    token: &CancellationToken,
    tx: &mpsc::Sender<Fragment>,
    error: ProviderError,
) -> RelayOutcome {
    tracing::warn!(error = %error, kind = error.kind(), "Upstream generation failed");
    metrics::record_upstream_error(provider.name(), error.kind());

    match emit(token, tx, Fragment::Failed(error.to_string())).await {
        Ok(()) => RelayOutcome::Failed,
        Err(outcome) => outcome,
    }
}

/// Response body bytes for a fragment stream.
///
/// Ends as soon as `token` is cancelled. Empty writes are dropped.
pub fn into_body_stream(
    fragments: ReceiverStream<Fragment>,
    token: CancellationToken,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    fragments
        .take_until(async move { token.cancelled().await })
        .map(Fragment::into_bytes)
        .filter(|bytes| futures::future::ready(!bytes.is_empty()))
        .map(Ok::<Bytes, Infallible>)
}
