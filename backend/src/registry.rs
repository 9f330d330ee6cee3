//! Model registry mapping model ids to upstream endpoints.

use std::collections::HashMap;

use pixeldesk_common::ModelEndpoint;

/// Immutable lookup table of known models, built once at startup.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    endpoints: HashMap<String, ModelEndpoint>,
    default_model: String,
}

impl ModelRegistry {
    pub fn new(
        endpoints: HashMap<String, ModelEndpoint>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            endpoints,
            default_model: default_model.into(),
        }
    }

    /// Model used when a request does not name one.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.endpoints.contains_key(model_id)
    }

    pub fn resolve(&self, model_id: &str) -> Option<&ModelEndpoint> {
        self.endpoints.get(model_id)
    }

    /// Registered model ids, sorted.
    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.endpoints.keys().cloned().collect();
        ids.sort();
        ids
    }
}
