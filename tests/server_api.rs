//! HTTP API tests for the completion backend

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use lingo_coach::config::Config;
use lingo_coach::server::{router, CompletionBackend, ServerState};
use lingo_coach::types::Exchange;

/// Records what it was asked and echoes the message back
#[derive(Default)]
struct EchoBackend {
    fail: bool,
    seen: Mutex<Vec<(String, Vec<Exchange>)>>,
}

#[async_trait]
impl CompletionBackend for EchoBackend {
    async fn complete(&self, message: &str, history: &[Exchange]) -> anyhow::Result<String> {
        self.seen.lock().unwrap().push((message.to_string(), history.to_vec()));
        if self.fail {
            anyhow::bail!("upstream exploded");
        }
        Ok(format!("echo: {}", message))
    }

    fn model(&self) -> &str {
        "test-model"
    }
}

fn app_with(config: Config, backend: Arc<EchoBackend>) -> Router {
    router(ServerState::new(config, backend))
}

fn app(backend: Arc<EchoBackend>) -> Router {
    app_with(Config::default(), backend)
}

async fn post_raw(app: &Router, body: String, client_ip: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client_ip)
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn post_chat(app: &Router, body: Value) -> (StatusCode, Value) {
    post_raw(app, body.to_string(), "198.51.100.1").await
}

#[tokio::test]
async fn test_status_reports_model_and_version() {
    let app = app(Arc::new(EchoBackend::default()));
    let request = Request::builder().uri("/api/status").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["version"], lingo_coach::VERSION);
}

#[tokio::test]
async fn test_chat_success() {
    let backend = Arc::new(EchoBackend::default());
    let app = app(backend.clone());

    let (status, body) = post_chat(&app, json!({"message": "  नमस्ते  "})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": "echo: नमस्ते"}));
    assert_eq!(backend.seen.lock().unwrap()[0].0, "नमस्ते");
}

#[tokio::test]
async fn test_history_truncated_to_recent_ten() {
    let backend = Arc::new(EchoBackend::default());
    let app = app(backend.clone());

    let history: Vec<Value> = (0..15)
        .map(|i| json!({"userText": format!("u{}", i), "aiText": format!("a{}", i)}))
        .collect();
    let (status, _) = post_chat(&app, json!({"message": "hi", "history": history})).await;
    assert_eq!(status, StatusCode::OK);

    let seen = backend.seen.lock().unwrap();
    let forwarded: Vec<&str> = seen[0].1.iter().map(|e| e.user_text.as_str()).collect();
    assert_eq!(forwarded.len(), 10);
    assert_eq!(forwarded.first(), Some(&"u5"));
    assert_eq!(forwarded.last(), Some(&"u14"));
}

#[tokio::test]
async fn test_validation_errors_are_400() {
    let backend = Arc::new(EchoBackend::default());
    let app = app(backend.clone());

    let cases = [
        json!({}),
        json!({"message": ""}),
        json!({"message": "x".repeat(2001)}),
        json!({"message": "hi", "history": {"not": "an array"}}),
        json!({"message": "hi", "history": [1, 2, 3]}),
    ];
    for case in cases {
        let (status, body) = post_chat(&app, case).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    let (status, _) = post_raw(&app, "{not json".to_string(), "198.51.100.1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(backend.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_message_at_limit_is_accepted() {
    let app = app(Arc::new(EchoBackend::default()));
    let (status, _) = post_chat(&app, json!({"message": "न".repeat(2000)})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_upstream_failure_is_500() {
    let backend = Arc::new(EchoBackend { fail: true, ..Default::default() });
    let app = app(backend);

    let (status, body) = post_chat(&app, json!({"message": "hi"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["error"].as_str().unwrap().contains("exploded"));
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let backend = Arc::new(EchoBackend::default());
    let mut config = Config::default();
    config.rate_limit.max_requests = 2;
    let app = app_with(config, backend.clone());

    let body = json!({"message": "hi"}).to_string();
    for _ in 0..2 {
        let (status, _) = post_raw(&app, body.clone(), "203.0.113.5").await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, reply) = post_raw(&app, body.clone(), "203.0.113.5, 10.0.0.1").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(reply["error"].is_string());

    let (status, _) = post_raw(&app, body, "203.0.113.6").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(backend.seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_rate_limit_applies_before_validation() {
    let mut config = Config::default();
    config.rate_limit.max_requests = 1;
    let app = app_with(config, Arc::new(EchoBackend::default()));

    let (status, _) = post_chat(&app, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = post_chat(&app, json!({})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
