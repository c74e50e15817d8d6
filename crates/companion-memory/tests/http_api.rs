//! Route-level tests against the axum router
#![cfg(feature = "cli")]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use companion_memory::worker_threads::PostProcessWorker;
use companion_memory::{
    build_router, AppState, Config, EngineConfig, InMemoryDocumentStore, MemoryEngine,
    TextGenerator, UnavailableGenerator,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        if prompt.starts_with("Extract") {
            return Ok("[]".to_string());
        }
        Ok("  Hey! Good to hear from you.  ".to_string())
    }
}

fn test_config() -> Config {
    Config {
        api_host: "127.0.0.1".to_string(),
        api_port: 5000,
        database_path: ":memory:".to_string(),
        generation_url: None,
        generation_model: "local-llm".to_string(),
        generation_api_key: None,
        generation_timeout_seconds: 5,
        request_timeout_seconds: 30,
        session_idle_seconds: 3600,
        context_window: 10,
        compaction_probability: 0.0,
        compaction_batch_limit: 20,
        bot_name: "Alex".to_string(),
    }
}

fn app_with(generator: Arc<dyn TextGenerator>) -> axum::Router {
    let config = test_config();
    let engine_config = EngineConfig { compaction_probability: 0.0, ..config.engine_config() };
    let engine = Arc::new(MemoryEngine::new(
        Arc::new(InMemoryDocumentStore::new()),
        generator,
        engine_config,
    ));
    let (queue, _handle) = PostProcessWorker::spawn(engine.clone());
    build_router(AppState::new(engine, queue, config), Duration::from_secs(30))
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_chat_roundtrip_and_history() {
    let app = app_with(Arc::new(EchoGenerator));

    let (status, body) = send(
        &app,
        json_request("POST", "/api/chat", json!({"userId": "u1", "message": "I'm so sad and depressed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Hey! Good to hear from you.");
    assert_eq!(body["tone"], "sad");
    assert_eq!(body["toneShift"], false);
    assert!(body["timestamp"].is_string());

    let (_, body) = send(
        &app,
        json_request("POST", "/api/chat", json!({"userId": "u1", "message": "WOW!!! amazing"})),
    )
    .await;
    assert_eq!(body["tone"], "excited");
    assert_eq!(body["toneShift"], true);

    let (status, body) = send(&app, get("/api/chat/u1?limit=3")).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], "assistant");
    assert_eq!(messages[1]["content"], "WOW!!! amazing");

    let (_, body) = send(&app, get("/api/chat/u1?limit=abc")).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_chat_rejects_missing_fields() {
    let app = app_with(Arc::new(EchoGenerator));

    let (status, body) = send(&app, json_request("POST", "/api/chat", json!({"userId": "u1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, _) = send(
        &app,
        json_request("POST", "/api/chat", json!({"userId": "", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        json_request("POST", "/api/chat", json!({"userId": "u1", "message": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_reports_bad_gateway_without_generator() {
    let app = app_with(Arc::new(UnavailableGenerator));

    let (status, body) = send(
        &app,
        json_request("POST", "/api/chat", json!({"userId": "u1", "message": "hello there"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("Failed to generate response"));

    let (_, body) = send(&app, get("/api/chat/u1")).await;
    assert!(body["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_memory_snapshot_and_name_update() {
    let app = app_with(Arc::new(EchoGenerator));

    let (status, body) = send(&app, get("/api/memory/u7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["userId"], "u7");
    assert!(body["memory"]["facts"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, json_request("PUT", "/api/memory/u7/name", json!({"name": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, json_request("PUT", "/api/memory/u7/name", json!({"name": "Sam"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["name"], "Sam");

    let (_, body) = send(&app, get("/api/memory/u7")).await;
    assert_eq!(body["memory"]["facts"][0]["text"], "User's name is Sam");
    assert_eq!(body["memory"]["facts"][0]["category"], "personal");
}

#[tokio::test]
async fn test_health_and_metrics() {
    companion_memory::metrics::init_metrics();
    let app = app_with(Arc::new(EchoGenerator));

    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("compacted_sessions_total"));
}
