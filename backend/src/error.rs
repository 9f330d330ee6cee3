//! Error types for the chat pipeline.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use pixeldesk_common::ErrorEnvelope;

use crate::upstream::UpstreamError;

/// Failure classes of a chat request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Request queue is full")]
    Backpressure,

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Upstream request timed out")]
    UpstreamTimeout,

    #[error("Upstream request failed: {message}")]
    UpstreamFailure {
        status: Option<u16>,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Validation(_) | ProxyError::UnknownModel(_) => StatusCode::BAD_REQUEST,
            ProxyError::Backpressure => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamFailure { status, .. } => status
                .and_then(|code| StatusCode::from_u16(code).ok())
                .filter(|code| code.is_client_error() || code.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable client-facing summary.
    pub fn public_message(&self) -> &'static str {
        match self {
            ProxyError::Validation(_) => "Invalid request",
            ProxyError::UnknownModel(_) => "Unknown model",
            ProxyError::Backpressure => "Too many requests",
            ProxyError::CircuitOpen => "Service temporarily unavailable",
            ProxyError::UpstreamTimeout => "Upstream request timed out",
            ProxyError::UpstreamFailure { .. } => "API request failed",
            ProxyError::Internal(_) => "Internal Server Error",
        }
    }

    /// Render as an HTTP error, with `details` only when `verbose` is set.
    pub fn into_reply(self, verbose: bool) -> ErrorReply {
        let mut envelope = ErrorEnvelope::new(self.public_message());
        if verbose {
            envelope = envelope.with_details(self.to_string());
        }
        ErrorReply {
            status: self.status(),
            envelope,
        }
    }
}

impl From<UpstreamError> for ProxyError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout => ProxyError::UpstreamTimeout,
            UpstreamError::Status { status, body } => ProxyError::UpstreamFailure {
                status: Some(status),
                message: format!("HTTP {}: {}", status, body),
            },
            other => ProxyError::UpstreamFailure {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

/// An error envelope paired with its HTTP status.
#[derive(Debug)]
pub struct ErrorReply {
    pub status: StatusCode,
    pub envelope: ErrorEnvelope,
}

impl IntoResponse for ErrorReply {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
