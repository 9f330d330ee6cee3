//! Integration tests for the chat proxy HTTP API.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pixeldesk_backend::config::DeployEnvironment;
use pixeldesk_backend::test_util::mock_upstream::{cloud_reply, error_json, local_reply};
use pixeldesk_backend::test_util::test_config_with_endpoints;
use pixeldesk_backend::{build_app, AppState, Config, HttpUpstream};
use pixeldesk_common::ChatRequest;

fn config_for(server: &MockServer) -> Config {
    test_config_with_endpoints(
        &format!("{}/generate", server.uri()),
        &format!("{}/cloud", server.uri()),
    )
}

fn state_with(config: Config) -> Arc<AppState> {
    let upstream = Arc::new(HttpUpstream::new(&config.upstream));
    Arc::new(AppState::new(config, upstream))
}

async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Bytes>,
) -> (StatusCode, Bytes) {
    let mut req_builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        req_builder = req_builder.header("Content-Type", "application/json");
    }
    let req = req_builder
        .body(match body {
            Some(b) => axum::body::Body::from(b),
            None => axum::body::Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes)
}

async fn post_chat(app: &axum::Router, body: Value) -> (StatusCode, Value) {
    let (status, bytes) = send(
        app,
        Method::POST,
        "/api/chat",
        Some(Bytes::from(body.to_string())),
    )
    .await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_local_chat_end_to_end_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_json(json!({"message": "hi", "turboMode": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(local_reply("hello there")))
        .expect(1)
        .mount(&server)
        .await;

    let state = state_with(config_for(&server));
    let app = build_app(state.clone());

    let (status, body) = post_chat(&app, json!({"message": "hi", "model": "deepseek-local"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "hello there");
    assert_eq!(body["metrics"]["model"], "deepseek-local");
    assert!(body["metrics"]["processingTime"].is_u64());

    let key = ChatRequest::new("hi", "deepseek-local", false).cache_key();
    assert!(state.pipeline.cache().get(&key).await.is_some());

    // Served from cache: the mock expects exactly one call.
    let (status, body) = post_chat(&app, json!({"message": "hi", "model": "deepseek-local"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "hello there");
}

#[tokio::test]
async fn test_cloud_chat_sends_bearer_and_inputs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cloud"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"inputs": "tell me a joke"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(cloud_reply("a joke")))
        .expect(1)
        .mount(&server)
        .await;

    let app = build_app(state_with(config_for(&server)));
    let (status, body) = post_chat(
        &app,
        json!({"message": "tell me a joke", "model": "llama-cloud", "turboMode": true}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "a joke");
    assert_eq!(body["metrics"]["model"], "llama-cloud");
}

#[tokio::test]
async fn test_validation_failures_return_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(local_reply("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let app = build_app(state_with(config_for(&server)));

    let (status, body) = post_chat(&app, json!({"message": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid request"}));

    let (status, body) = post_chat(&app, json!({"message": 12})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");

    let (status, body) = post_chat(&app, json!({"message": "hi", "model": "gpt-17"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown model");

    let (status, bytes) = send(&app, Method::POST, "/api/chat", Some(Bytes::from("{oops"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Invalid request");
}

#[tokio::test]
async fn test_long_message_truncated_before_forwarding() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_json(json!({"message": "a".repeat(1000), "turboMode": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(local_reply("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let app = build_app(state_with(config_for(&server)));
    let (status, _) = post_chat(&app, json!({"message": "a".repeat(1500)})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_upstream_status_propagates_with_details_in_development() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(503).set_body_json(error_json("model loading")))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.server.environment = DeployEnvironment::Development;
    let app = build_app(state_with(config));

    let (status, body) = post_chat(&app, json!({"message": "hi"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "API request failed");
    assert!(body["details"].as_str().unwrap().contains("model loading"));
}

#[tokio::test]
async fn test_upstream_error_hides_details_in_production() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_json(error_json("stack trace")))
        .mount(&server)
        .await;

    let app = build_app(state_with(config_for(&server)));
    let (status, body) = post_chat(&app, json!({"message": "hi"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "API request failed"}));
}

#[tokio::test]
async fn test_upstream_timeout_is_gateway_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(local_reply("too late"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = config_for(&server);
    let upstream = Arc::new(
        HttpUpstream::new(&config.upstream)
            .with_timeouts(Duration::from_millis(100), Duration::from_millis(100)),
    );
    let state = Arc::new(AppState::new(config, upstream));
    let app = build_app(state.clone());

    let (status, body) = post_chat(&app, json!({"message": "hi"})).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "Upstream request timed out");
    assert_eq!(state.pipeline.circuit().failure_count(), 1);
}

#[tokio::test]
async fn test_circuit_trip_blocks_upstream_until_reset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.circuit.failure_threshold = 2;
    let state = state_with(config);
    let app = build_app(state.clone());

    for i in 0..3 {
        let (status, _) = post_chat(&app, json!({"message": format!("attempt {}", i)})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
    assert!(state.pipeline.circuit().check());

    let (status, body) = post_chat(&app, json!({"message": "while open"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Service temporarily unavailable");

    let (_, bytes) = send(&app, Method::GET, "/health", None).await;
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["circuit"], "open");

    state.pipeline.circuit().close();
    assert_eq!(state.pipeline.circuit().failure_count(), 0);

    // Closed again: the next request is forwarded (the fourth upstream call).
    let (status, body) = post_chat(&app, json!({"message": "after reset"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "API request failed");
    assert_eq!(state.pipeline.circuit().failure_count(), 1);
}

#[tokio::test]
async fn test_rate_limit_rejects_after_quota() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(local_reply("ok")))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.rate_limit.enabled = true;
    config.rate_limit.max_requests = 2;
    config.rate_limit.window_secs = 900;
    let app = build_app(state_with(config));

    for _ in 0..2 {
        let (status, _) = post_chat(&app, json!({"message": "hi"})).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = post_chat(&app, json!({"message": "hi"})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({"error": "Too many requests"}));

    // Other routes are not limited.
    let (status, _) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_batched_mode_isolates_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_partial_json(json!({"message": "bad"})))
        .respond_with(ResponseTemplate::new(502))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(local_reply("fine")))
        .with_priority(2)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.pipeline.batching = true;
    let state = state_with(config);
    let app = build_app(state.clone());

    let requests = ["good-1", "bad", "good-2"].map(|message| {
        let app = app.clone();
        tokio::spawn(async move { post_chat(&app, json!({ "message": message })).await })
    });

    let mut outcomes = Vec::new();
    for handle in requests {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(outcomes[0].0, StatusCode::OK);
    assert_eq!(outcomes[0].1["response"], "fine");
    assert_eq!(outcomes[1].0, StatusCode::BAD_GATEWAY);
    assert_eq!(outcomes[2].0, StatusCode::OK);

    let cache = state.pipeline.cache();
    assert!(cache
        .get(&ChatRequest::new("good-1", "deepseek-local", false).cache_key())
        .await
        .is_some());
    assert!(cache
        .get(&ChatRequest::new("bad", "deepseek-local", false).cache_key())
        .await
        .is_none());
}

#[tokio::test]
async fn test_health_metrics_and_models() {
    let server = MockServer::start().await;
    let app = build_app(state_with(config_for(&server)));

    let (status, bytes) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["circuit"], "closed");

    let (status, bytes) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("pixeldesk_requests_total 0"));
    assert!(text.contains("pixeldesk_circuit_open 0"));

    let (status, bytes) = send(&app, Method::GET, "/api/models", None).await;
    assert_eq!(status, StatusCode::OK);
    let models: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        models,
        json!({"models": [
            {"id": "deepseek-local", "kind": "local", "default": true},
            {"id": "llama-cloud", "kind": "cloud", "default": false},
        ]})
    );
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let server = MockServer::start().await;
    let app = build_app(state_with(config_for(&server)));

    for uri in ["/health", "/index.html"] {
        let req = Request::builder()
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
        assert_eq!(headers["referrer-policy"], "no-referrer");
    }
}

#[tokio::test]
async fn test_unknown_path_falls_through_to_static_assets() {
    let server = MockServer::start().await;
    let app = build_app(state_with(config_for(&server)));

    let (status, _) = send(&app, Method::GET, "/index.html", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
