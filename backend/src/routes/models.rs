//! GET /api/models - the models a client may name in a chat request.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use pixeldesk_common::EndpointKind;

use crate::AppState;

/// Model entry in the response.
#[derive(Debug, Clone, Serialize)]
pub struct ModelObject {
    pub id: String,
    pub kind: EndpointKind,
    pub default: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelObject>,
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let registry = state.pipeline.registry();
    let models = registry
        .model_ids()
        .into_iter()
        .filter_map(|id| {
            let kind = registry.resolve(&id)?.kind;
            let default = id == registry.default_model();
            Some(ModelObject { id, kind, default })
        })
        .collect();

    Json(ModelsResponse { models })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .with_state(state)
}
