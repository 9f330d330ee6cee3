//! Request batching queue.
//!
//! Items are drained in FIFO order, up to `batch_size` per cycle, and their
//! upstream calls run concurrently with independent outcomes. A drain that
//! leaves items behind schedules another one after a short delay; there is
//! no long-lived worker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{oneshot, Mutex};

use pixeldesk_common::{ChatRequest, ChatResponse, ModelEndpoint};

use crate::cache::ResponseCache;
use crate::circuit::CircuitBreaker;
use crate::error::ProxyError;
use crate::metrics::PipelineMetrics;
use crate::upstream::Upstream;

/// Configuration for the batch queue.
#[derive(Debug, Clone)]
pub struct BatchQueueConfig {
    /// Maximum items dispatched per drain.
    pub batch_size: usize,
    /// Delay before draining a queue that still holds items.
    pub redrain_delay: Duration,
}

impl BatchQueueConfig {
    pub fn new(batch_size: usize, redrain_delay: Duration) -> Self {
        Self {
            batch_size,
            redrain_delay,
        }
    }
}

/// A queued request waiting to be dispatched.
pub struct BatchItem {
    pub request: ChatRequest,
    pub endpoint: ModelEndpoint,
    /// Channel to send the outcome back to the caller.
    pub response_tx: oneshot::Sender<Result<ChatResponse, ProxyError>>,
}

pub struct BatchQueue {
    config: BatchQueueConfig,
    items: Mutex<VecDeque<BatchItem>>,
    draining: AtomicBool,
    upstream: Arc<dyn Upstream>,
    cache: Arc<ResponseCache>,
    circuit: Arc<CircuitBreaker>,
    metrics: Arc<PipelineMetrics>,
}

impl BatchQueue {
    pub fn new(
        config: BatchQueueConfig,
        upstream: Arc<dyn Upstream>,
        cache: Arc<ResponseCache>,
        circuit: Arc<CircuitBreaker>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            config,
            items: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            upstream,
            cache,
            circuit,
            metrics,
        }
    }

    /// Enqueue a request and kick off a drain.
    ///
    /// Returns a receiver that resolves once the request's batch completes.
    pub async fn enqueue(
        self: &Arc<Self>,
        request: ChatRequest,
        endpoint: ModelEndpoint,
    ) -> oneshot::Receiver<Result<ChatResponse, ProxyError>> {
        let (tx, rx) = oneshot::channel();
        self.push(BatchItem {
            request,
            endpoint,
            response_tx: tx,
        })
        .await;
        self.schedule(Duration::ZERO);
        rx
    }

    /// Append an item without draining.
    pub async fn push(&self, item: BatchItem) {
        self.items.lock().await.push_back(item);
    }

    pub async fn pending_count(&self) -> usize {
        self.items.lock().await.len()
    }

    fn schedule(self: &Arc<Self>, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            queue.process().await;
        });
    }

    /// Drain one batch. No-op while another drain runs or when empty.
    pub async fn process(self: Arc<Self>) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }

        let batch: Vec<BatchItem> = {
            let mut items = self.items.lock().await;
            let take = self.config.batch_size.min(items.len());
            items.drain(..take).collect()
        };

        if !batch.is_empty() {
            self.dispatch(batch).await;
        }

        self.draining.store(false, Ordering::SeqCst);

        if self.pending_count().await > 0 {
            self.schedule(self.config.redrain_delay);
        }
    }

    async fn dispatch(&self, batch: Vec<BatchItem>) {
        tracing::debug!(size = batch.len(), "Dispatching batch");
        self.metrics.record_batch();
        self.metrics.record_upstream_calls(batch.len() as u64);

        let results = join_all(
            batch
                .iter()
                .map(|item| self.upstream.generate(&item.endpoint, &item.request)),
        )
        .await;

        let mut failed = 0usize;
        for (item, result) in batch.into_iter().zip(results) {
            let outcome = match result {
                Ok(text) => {
                    let response = ChatResponse::new(text);
                    self.cache
                        .set(item.request.cache_key(), response.clone())
                        .await;
                    Ok(response)
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        model = %item.request.model,
                        error = %e,
                        "Batched upstream call failed"
                    );
                    Err(ProxyError::from(e))
                }
            };
            // Receiver may be gone if the caller disconnected.
            let _ = item.response_tx.send(outcome);
        }

        if failed > 0 {
            let total = self.circuit.record_failure();
            tracing::warn!(failed, failures = total, "Batch completed with failures");
        }
    }
}
