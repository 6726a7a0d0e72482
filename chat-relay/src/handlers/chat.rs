use crate::models::ChatRequest;
use crate::services::generation::build_generation_config;
use crate::services::history::build_messages;
use crate::services::metrics;
use crate::services::relay::{into_body_stream, spawn_relay, RelayRequest};
use crate::startup::AppState;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;

pub const TEXT_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

/// `POST /chat`: start a generation and stream its text back.
///
/// Validation happens before any upstream call. Once the 200 headers are
/// sent, upstream faults can only be reported inside the body.
#[tracing::instrument(skip_all)]
pub async fn start_chat(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = match body {
        Ok(Json(value)) => Some(value),
        Err(rejection) => {
            tracing::debug!(reason = %rejection.body_text(), "Chat body could not be read");
            None
        }
    };
    let request = ChatRequest::from_body(body)?;

    let generations = &state.generations;
    let relay_request = RelayRequest {
        model: generations.model_id().to_string(),
        messages: build_messages(&request.context_history, &request.user_input),
        config: build_generation_config(generations.search_enabled()),
    };

    let handle = generations.begin();
    let token = handle.token().clone();

    tracing::info!(
        generation_id = %handle.id(),
        model = %relay_request.model,
        history_len = request.context_history.len(),
        search_enabled = generations.search_enabled(),
        "Starting generation"
    );

    let fragments = spawn_relay(state.provider.clone(), relay_request, handle);

    Ok((
        [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
        Body::from_stream(into_body_stream(fragments, token)),
    )
        .into_response())
}

/// `POST /stop-generation`: cancel whatever is generating. Always succeeds.
#[tracing::instrument(skip_all)]
pub async fn stop_generation(State(state): State<AppState>) -> impl IntoResponse {
    let stopped = state.generations.stop_all();
    metrics::record_stop_request();
    tracing::info!(stopped, "Stop generation requested");

    (
        StatusCode::OK,
        Json(json!({ "status": "Generation stopped" })),
    )
}

/// `OPTIONS` on the chat routes.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}
