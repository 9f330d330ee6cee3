//! Admission pipeline for chat requests.
//!
//! Cheap rejections (open circuit, full queue, bad input) happen before any
//! upstream work. Accepted requests are served from the cache when possible,
//! otherwise forwarded upstream either directly or through the batch queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pixeldesk_common::{ChatRequest, ChatResponse, ModelEndpoint};

use crate::batch::{BatchQueue, BatchQueueConfig};
use crate::cache::ResponseCache;
use crate::circuit::CircuitBreaker;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::metrics::PipelineMetrics;
use crate::registry::ModelRegistry;
use crate::upstream::Upstream;
use crate::validate::{parse_body, validate_chat_request};

pub struct ChatPipeline {
    registry: ModelRegistry,
    max_input_length: usize,
    max_pending: usize,
    pending: AtomicUsize,
    cache: Arc<ResponseCache>,
    circuit: Arc<CircuitBreaker>,
    upstream: Arc<dyn Upstream>,
    /// Present when upstream calls go through the batch queue.
    batch_queue: Option<Arc<BatchQueue>>,
    metrics: Arc<PipelineMetrics>,
}

/// Holds one admission slot until dropped.
struct PendingGuard<'a> {
    pending: &'a AtomicUsize,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChatPipeline {
    pub fn new(config: &Config, upstream: Arc<dyn Upstream>) -> Self {
        let cache = Arc::new(ResponseCache::new(config.cache.ttl()));
        let circuit = Arc::new(CircuitBreaker::from_config(&config.circuit));
        let metrics = Arc::new(PipelineMetrics::new());

        let batch_queue = config.pipeline.batching.then(|| {
            Arc::new(BatchQueue::new(
                BatchQueueConfig::new(config.pipeline.batch_size, config.pipeline.batch_delay()),
                upstream.clone(),
                cache.clone(),
                circuit.clone(),
                metrics.clone(),
            ))
        });

        Self {
            registry: ModelRegistry::new(
                config.models.clone(),
                config.pipeline.default_model.clone(),
            ),
            max_input_length: config.pipeline.max_input_length,
            max_pending: config.pipeline.max_queue_size,
            pending: AtomicUsize::new(0),
            cache,
            circuit,
            upstream,
            batch_queue,
            metrics,
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn circuit(&self) -> &Arc<CircuitBreaker> {
        &self.circuit
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Admitted requests currently in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn try_admit(&self) -> Option<PendingGuard<'_>> {
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_pending).then_some(n + 1)
            })
            .ok()
            .map(|_| PendingGuard {
                pending: &self.pending,
            })
    }

    /// Handle one raw `POST /api/chat` body.
    pub async fn handle(&self, body: &[u8]) -> Result<ChatResponse> {
        let start = Instant::now();
        self.metrics.record_request();

        let result = self.admit_and_process(body, start).await;
        match &result {
            Ok(_) => self.metrics.record_response_time(start.elapsed()),
            Err(e) => {
                self.metrics.record_error();
                tracing::debug!(error = %e, "Chat request rejected");
            }
        }
        result
    }

    async fn admit_and_process(&self, body: &[u8], start: Instant) -> Result<ChatResponse> {
        if self.circuit.is_open() {
            return Err(ProxyError::CircuitOpen);
        }

        let _slot = self.try_admit().ok_or(ProxyError::Backpressure)?;

        let raw = parse_body(body)?;
        let request = validate_chat_request(&raw, &self.registry, self.max_input_length)?;

        let key = request.cache_key();
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(model = %request.model, "Cache hit");
            self.metrics.record_cache_hit();
            return Ok(cached);
        }

        let endpoint = self
            .registry
            .resolve(&request.model)
            .cloned()
            .ok_or_else(|| ProxyError::UnknownModel(request.model.clone()))?;

        let response = match &self.batch_queue {
            Some(queue) => self.call_batched(queue, request.clone(), endpoint).await?,
            None => self.call_direct(&key, &request, &endpoint).await?,
        };

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(response.with_metrics(elapsed_ms, request.model))
    }

    async fn call_direct(
        &self,
        key: &str,
        request: &ChatRequest,
        endpoint: &ModelEndpoint,
    ) -> Result<ChatResponse> {
        self.metrics.record_upstream_calls(1);
        match self.upstream.generate(endpoint, request).await {
            Ok(text) => {
                let response = ChatResponse::new(text);
                self.cache.set(key.to_string(), response.clone()).await;
                Ok(response)
            }
            Err(e) => {
                let failures = self.circuit.record_failure();
                tracing::warn!(
                    model = %request.model,
                    url = %endpoint.url,
                    failures,
                    error = %e,
                    "Upstream call failed"
                );
                Err(e.into())
            }
        }
    }

    // Failures are counted by the batch itself, once per failed batch.
    async fn call_batched(
        &self,
        queue: &Arc<BatchQueue>,
        request: ChatRequest,
        endpoint: ModelEndpoint,
    ) -> Result<ChatResponse> {
        let rx = queue.enqueue(request, endpoint).await;
        rx.await
            .map_err(|_| ProxyError::Internal("batch dropped the request".to_string()))?
    }
}
