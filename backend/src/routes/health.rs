use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::circuit::CircuitState;
use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    circuit: &'static str,
    started_at: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let circuit = state.pipeline.circuit().state();
    Json(HealthResponse {
        status: if circuit == CircuitState::Open { "degraded" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        circuit: circuit.as_str(),
        started_at: state.started_at.to_rfc3339(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let pipeline = &state.pipeline;
    let snapshot = pipeline.metrics().snapshot();
    tracing::debug!(?snapshot, "Metrics scraped");
    let body = snapshot.render_prometheus(
        pipeline.circuit().is_open(),
        pipeline.cache().len().await,
        pipeline.pending_count(),
    );
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}
