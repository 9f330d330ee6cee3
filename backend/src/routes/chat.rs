use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    middleware,
    routing::post,
    Json, Router,
};

use pixeldesk_common::ChatResponse;

use crate::error::ErrorReply;
use crate::rate_limit::enforce_rate_limit;
use crate::AppState;

/// POST /api/chat - cached, circuit-protected chat proxy.
///
/// The body is read raw so that malformed JSON still gets the JSON error
/// envelope instead of the extractor's plain-text rejection.
async fn chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ChatResponse>, ErrorReply> {
    state
        .pipeline
        .handle(&body)
        .await
        .map(Json)
        .map_err(|e| e.into_reply(state.config.server.verbose_errors()))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route_layer(middleware::from_fn_with_state(state.clone(), enforce_rate_limit))
        .with_state(state)
}
