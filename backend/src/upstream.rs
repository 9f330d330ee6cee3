//! Clients for the upstream inference endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use pixeldesk_common::{ChatRequest, EndpointKind, ModelEndpoint};

use crate::config::UpstreamConfig;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream call timed out")]
    Timeout,
    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP request failed: {0}")]
    Transport(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("No API key configured for cloud endpoint")]
    MissingCredential,
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// Something that can turn a chat request into generated text.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn generate(
        &self,
        endpoint: &ModelEndpoint,
        request: &ChatRequest,
    ) -> Result<String, UpstreamError>;
}

/// Local server request format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocalGenerateRequest<'a> {
    message: &'a str,
    turbo_mode: bool,
}

/// Hosted inference request format.
#[derive(Debug, Serialize)]
struct CloudGenerateRequest<'a> {
    inputs: &'a str,
    parameters: CloudParameters,
}

#[derive(Debug, Serialize)]
struct CloudParameters {
    max_length: u32,
    temperature: f32,
    return_full_text: bool,
}

/// HTTP client for local and cloud endpoints.
pub struct HttpUpstream {
    http_client: Client,
    api_key: Option<String>,
    local_timeout: Duration,
    cloud_timeout: Duration,
    max_length: u32,
    temperature: f32,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            http_client: Client::new(),
            api_key: config.api_key.clone(),
            local_timeout: Duration::from_secs(config.local_timeout_secs),
            cloud_timeout: Duration::from_secs(config.cloud_timeout_secs),
            max_length: config.max_length,
            temperature: config.temperature,
        }
    }

    pub fn with_timeouts(mut self, local: Duration, cloud: Duration) -> Self {
        self.local_timeout = local;
        self.cloud_timeout = cloud;
        self
    }

    async fn generate_local(
        &self,
        url: &str,
        request: &ChatRequest,
    ) -> Result<String, UpstreamError> {
        let body = LocalGenerateRequest {
            message: &request.message,
            turbo_mode: request.turbo_mode,
        };

        let response = self
            .http_client
            .post(url)
            .timeout(self.local_timeout)
            .json(&body)
            .send()
            .await?;

        let value = read_json(response).await?;
        extract_generated_text(&value).ok_or_else(|| {
            UpstreamError::InvalidResponse("missing generated_text in local response".to_string())
        })
    }

    async fn generate_cloud(
        &self,
        url: &str,
        request: &ChatRequest,
    ) -> Result<String, UpstreamError> {
        let api_key = self.api_key.as_deref().ok_or(UpstreamError::MissingCredential)?;

        let body = CloudGenerateRequest {
            inputs: &request.message,
            parameters: CloudParameters {
                max_length: self.max_length,
                temperature: self.temperature,
                return_full_text: false,
            },
        };

        let response = self
            .http_client
            .post(url)
            .timeout(self.cloud_timeout)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let value = read_json(response).await?;
        value
            .as_array()
            .and_then(|items| items.first())
            .and_then(|first| first.get("generated_text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                UpstreamError::InvalidResponse(
                    "expected an array whose first element has generated_text".to_string(),
                )
            })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn generate(
        &self,
        endpoint: &ModelEndpoint,
        request: &ChatRequest,
    ) -> Result<String, UpstreamError> {
        tracing::debug!(url = %endpoint.url, kind = %endpoint.kind, "Sending upstream request");
        match endpoint.kind {
            EndpointKind::Local => self.generate_local(&endpoint.url, request).await,
            EndpointKind::Cloud => self.generate_cloud(&endpoint.url, request).await,
        }
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, UpstreamError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Status { status, body });
    }

    // A body that stalls past the request timeout surfaces as `Timeout`.
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| UpstreamError::InvalidResponse(e.to_string()))
}

/// Pull generated text out of the shapes local servers are known to return.
fn extract_generated_text(value: &Value) -> Option<String> {
    let target = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    target
        .get("generated_text")
        .or_else(|| target.get("response"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
