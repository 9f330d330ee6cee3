//! Chat payloads exchanged over `POST /api/chat`.

use serde::{Deserialize, Serialize};

/// A validated, normalized chat request.
///
/// Produced by the proxy's validator; the message is already trimmed of
/// angle brackets and truncated to the configured bound, and `model` always
/// names a registered endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub model: String,
    #[serde(default)]
    pub turbo_mode: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, model: impl Into<String>, turbo_mode: bool) -> Self {
        Self {
            message: message.into(),
            model: model.into(),
            turbo_mode,
        }
    }

    /// Deterministic string form used as the response cache key.
    ///
    /// Two requests with the same model, message and mode map to the same key.
    pub fn cache_key(&self) -> String {
        // Object keys serialize in sorted order, so the output is stable.
        serde_json::json!({
            "message": self.message,
            "model": self.model,
            "turboMode": self.turbo_mode,
        })
        .to_string()
    }
}

/// Successful chat response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ResponseMetrics>,
}

impl ChatResponse {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, processing_time_ms: u64, model: impl Into<String>) -> Self {
        self.metrics = Some(ResponseMetrics {
            processing_time: processing_time_ms,
            model: model.into(),
        });
        self
    }
}

/// Per-response processing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetrics {
    /// Wall-clock time spent in the proxy, in milliseconds.
    pub processing_time: u64,
    pub model: String,
}

/// JSON error body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
