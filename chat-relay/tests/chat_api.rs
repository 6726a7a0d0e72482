//! Router-level tests for the chat relay using the mock provider.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chat_relay::build_router;
use chat_relay::models::Message;
use chat_relay::services::providers::mock::{MockChatProvider, MockStep};
use chat_relay::services::providers::{ChatProvider, ResponseChunk};
use chat_relay::services::GenerationState;
use chat_relay::AppState;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

struct TestApp {
    router: Router,
    provider: Arc<MockChatProvider>,
    generations: Arc<GenerationState>,
}

fn test_app(provider: MockChatProvider) -> TestApp {
    let provider = Arc::new(provider);
    let generations = Arc::new(GenerationState::new("gemini-1.5-flash", true));
    let state = AppState::new(
        provider.clone() as Arc<dyn ChatProvider>,
        generations.clone(),
    );

    TestApp {
        router: build_router(state),
        provider,
        generations,
    }
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn stop_request() -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/stop-generation")
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = tokio::time::timeout(Duration::from_secs(5), response.into_body().collect())
        .await
        .expect("body did not finish")
        .unwrap()
        .to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn chat_streams_model_text() {
    let app = test_app(MockChatProvider::with_fragments([
        "For God so loved",
        " the world",
    ]));

    let response = app
        .router
        .oneshot(chat_request(json!({
            "user_input": "What is John 3:16?",
            "context_history": []
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain;charset=utf-8"
    );

    let body = body_text(response).await;
    assert_eq!(body, "For God so loved the world");
    assert!(!body.contains("Error during generation:"));
}

#[tokio::test]
async fn chat_forwards_formatted_history_and_settings() {
    let app = test_app(MockChatProvider::with_fragments(["ok"]));

    let response = app
        .router
        .oneshot(chat_request(json!({
            "user_input": "And verse 17?",
            "context_history": [
                {"sender": "user", "content": "What is John 3:16?"},
                {"sender": "assistant", "content": "For God so loved the world..."}
            ]
        })))
        .await
        .unwrap();
    body_text(response).await;

    let call = app.provider.last_call().expect("provider was not called");
    assert_eq!(call.model, "gemini-1.5-flash");
    assert_eq!(
        call.messages,
        vec![
            Message::user("What is John 3:16?"),
            Message::model("For God so loved the world..."),
            Message::user("And verse 17?"),
        ]
    );
    assert_eq!(call.config.temperature, 0.2);
    assert_eq!(call.config.tools.len(), 1);
}

#[tokio::test]
async fn chat_without_body_is_rejected() {
    let app = test_app(MockChatProvider::with_fragments(["unused"]));

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/chat")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "No data provided" })
    );
    assert_eq!(app.provider.calls(), 0);
}

#[tokio::test]
async fn chat_with_unparseable_body_is_rejected() {
    let app = test_app(MockChatProvider::with_fragments(["unused"]));

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "No data provided" })
    );
}

#[tokio::test]
async fn chat_with_empty_input_is_rejected_before_upstream() {
    let app = test_app(MockChatProvider::with_fragments(["unused"]));

    let response = app
        .router
        .clone()
        .oneshot(chat_request(json!({
            "user_input": "",
            "context_history": []
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "No user input provided" })
    );
    assert_eq!(app.provider.calls(), 0);
    assert_eq!(app.generations.active_count(), 0);
}

#[tokio::test]
async fn chat_with_malformed_history_is_rejected() {
    let app = test_app(MockChatProvider::with_fragments(["unused"]));

    let response = app
        .router
        .oneshot(chat_request(json!({
            "user_input": "hi",
            "context_history": [{"content": "missing sender"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Invalid context history" })
    );
    assert_eq!(app.provider.calls(), 0);
}

#[tokio::test]
async fn upstream_failure_is_reported_inline_with_200() {
    let app = test_app(MockChatProvider::new(vec![
        MockStep::Chunk(ResponseChunk::text(["Partial answer. "])),
        MockStep::Fail("connection reset".to_string()),
    ]));

    let response = app
        .router
        .oneshot(chat_request(json!({ "user_input": "hi" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "Partial answer. Error during generation: Network error: connection reset"
    );
}

#[tokio::test]
async fn stop_generation_reports_success() {
    let app = test_app(MockChatProvider::with_fragments(["unused"]));

    for _ in 0..2 {
        let response = app.router.clone().oneshot(stop_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "status": "Generation stopped" })
        );
    }
}

#[tokio::test]
async fn stop_generation_ends_in_flight_stream() {
    let app = test_app(
        MockChatProvider::with_fragments(["one ", "two ", "three ", "four "])
            .with_delay(Duration::from_millis(50)),
    );

    let response = app
        .router
        .clone()
        .oneshot(chat_request(json!({ "user_input": "count" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let first = body
        .frame()
        .await
        .expect("stream ended early")
        .unwrap()
        .into_data()
        .unwrap();
    assert_eq!(&first[..], b"one ");

    let stop = app.router.clone().oneshot(stop_request()).await.unwrap();
    assert_eq!(stop.status(), StatusCode::OK);

    let rest = tokio::time::timeout(Duration::from_secs(5), body.collect())
        .await
        .expect("body did not end after stop")
        .unwrap()
        .to_bytes();
    assert!(rest.is_empty(), "received text after stop: {:?}", rest);
}

#[tokio::test]
async fn new_chat_after_stop_is_not_cancelled() {
    let app = test_app(MockChatProvider::with_fragments(["fresh"]));

    app.router.clone().oneshot(stop_request()).await.unwrap();

    let response = app
        .router
        .oneshot(chat_request(json!({ "user_input": "hi" })))
        .await
        .unwrap();
    assert_eq!(body_text(response).await, "fresh");
}

#[tokio::test]
async fn options_requests_return_no_content() {
    let app = test_app(MockChatProvider::with_fragments(["unused"]));

    for uri in ["/chat", "/stop-generation"] {
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri(uri)
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT, "OPTIONS {}", uri);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
        assert!(body_text(response).await.is_empty());
    }
}

#[tokio::test]
async fn responses_allow_cross_origin_access() {
    let app = test_app(MockChatProvider::with_fragments(["unused"]));

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/stop-generation")
                .header(header::ORIGIN, "https://bible.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://bible.example"
    );
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn health_check_returns_ok() {
    let app = test_app(MockChatProvider::with_fragments(["unused"]));

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "chat-relay");
    assert_eq!(body["model"], "gemini-1.5-flash");
}

#[tokio::test]
async fn readiness_follows_provider_health() {
    let ready = test_app(MockChatProvider::with_fragments(["unused"]));
    let response = ready
        .router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let broken = test_app(MockChatProvider::failing_on_open("no key"));
    let response = broken
        .router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Service unavailable" })
    );
}
