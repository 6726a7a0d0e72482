//! Application startup and lifecycle management.

use crate::config::RelayConfig;
use crate::handlers::{
    chat::{preflight, start_chat, stop_generation},
    health::{health_check, metrics, readiness_check},
};
use crate::services::providers::gemini::{GeminiChatProvider, GeminiConfig};
use crate::services::providers::ChatProvider;
use crate::services::GenerationState;
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::config::Config as ServerConfig;
use service_core::error::AppError;
use service_core::middleware::{
    cors::{permissive_cors_layer, preflight_no_content},
    metrics::metrics_middleware,
    tracing::request_id_middleware,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn ChatProvider>,
    pub generations: Arc<GenerationState>,
}

impl AppState {
    pub fn new(provider: Arc<dyn ChatProvider>, generations: Arc<GenerationState>) -> Self {
        Self {
            provider,
            generations,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(start_chat).options(preflight))
        .route("/stop-generation", post(stop_generation).options(preflight))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .layer(permissive_cors_layer())
        .layer(from_fn(preflight_no_content))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: RelayConfig) -> Result<Self, AppError> {
        let provider = GeminiChatProvider::new(GeminiConfig {
            api_key: config.gemini.api_key.clone(),
            api_base: config.gemini.api_base.clone(),
            connect_timeout: config.gemini.connect_timeout(),
        })
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

        tracing::info!(
            model = %config.models.chat_model,
            search_enabled = config.models.search_enabled,
            "Initialized Gemini chat provider"
        );

        let generations = Arc::new(GenerationState::new(
            config.models.chat_model.clone(),
            config.models.search_enabled,
        ));

        Self::with_state(&config.common, AppState::new(Arc::new(provider), generations)).await
    }

    /// Build the application around an existing state (e.g., a mock provider).
    pub async fn with_state(server: &ServerConfig, state: AppState) -> Result<Self, AppError> {
        // Port 0 = random port for testing
        let addr = server.bind_address();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Chat relay listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Run until `shutdown` resolves, then stop accepting connections.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state);

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
