pub mod mock_upstream;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use pixeldesk_common::{ChatRequest, ModelEndpoint};

use crate::config::{Config, DeployEnvironment};
use crate::upstream::{Upstream, UpstreamError};

/// Configuration with small limits and no rate limiting, pointing at
/// placeholder endpoints.
pub fn test_config() -> Config {
    test_config_with_endpoints("http://127.0.0.1:9/generate", "http://127.0.0.1:9/cloud")
}

/// Configuration whose `deepseek-local` and `llama-cloud` models point at
/// the given URLs.
pub fn test_config_with_endpoints(local_url: &str, cloud_url: &str) -> Config {
    let mut config = Config::default();
    config.server.environment = DeployEnvironment::Production;
    config.server.static_dir = "./nonexistent-static-dir".to_string();
    config.rate_limit.enabled = false;
    config.upstream.api_key = Some("test-key".to_string());
    config.pipeline.batch_delay_ms = 5;
    config.logging.level = "debug".to_string();
    config.models = HashMap::from([
        ("deepseek-local".to_string(), ModelEndpoint::local(local_url)),
        ("llama-cloud".to_string(), ModelEndpoint::cloud(cloud_url)),
    ]);
    config
}

type Responder = dyn Fn(&ChatRequest) -> Result<String, UpstreamError> + Send + Sync;

/// In-process [`Upstream`] driven by a closure, recording every call.
pub struct ScriptedUpstream {
    responder: Box<Responder>,
    delay: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<String, UpstreamError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Replies `"echo: <message>"`.
    pub fn echo() -> Self {
        Self::new(|req| Ok(format!("echo: {}", req.message)))
    }

    /// Always fails with the given HTTP status.
    pub fn failing(status: u16) -> Self {
        Self::new(move |_| {
            Err(UpstreamError::Status {
                status,
                body: "scripted failure".to_string(),
            })
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages received, in call order.
    pub fn seen_messages(&self) -> Vec<String> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn generate(
        &self,
        _endpoint: &ModelEndpoint,
        request: &ChatRequest,
    ) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.message.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.responder)(request)
    }
}
