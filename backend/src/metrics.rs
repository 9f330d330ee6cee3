//! Process-wide pipeline counters.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    requests: AtomicU64,
    errors: AtomicU64,
    cache_hits: AtomicU64,
    upstream_calls: AtomicU64,
    batches: AtomicU64,
    completed: AtomicU64,
    response_time_ms_total: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub upstream_calls: u64,
    pub batches: u64,
    pub avg_response_ms: f64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_calls(&self, count: u64) {
        self.upstream_calls.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_time(&self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.response_time_ms_total.fetch_add(ms, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let completed = self.completed.load(Ordering::Relaxed);
        let total = self.response_time_ms_total.load(Ordering::Relaxed);
        let avg_response_ms = if completed == 0 {
            0.0
        } else {
            total as f64 / completed as f64
        };

        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            avg_response_ms,
        }
    }
}

impl MetricsSnapshot {
    /// Render in the Prometheus text exposition format.
    pub fn render_prometheus(
        &self,
        circuit_open: bool,
        cache_entries: usize,
        pending: usize,
    ) -> String {
        let mut out = String::new();
        let counters = [
            ("pixeldesk_requests_total", "Chat requests received", self.requests),
            ("pixeldesk_errors_total", "Chat requests that failed", self.errors),
            (
                "pixeldesk_cache_hits_total",
                "Chat requests served from cache",
                self.cache_hits,
            ),
            (
                "pixeldesk_upstream_calls_total",
                "Calls issued to upstream endpoints",
                self.upstream_calls,
            ),
            (
                "pixeldesk_batches_total",
                "Batches dispatched by the batch queue",
                self.batches,
            ),
        ];
        for (name, help, value) in counters {
            let _ = write!(out, "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n");
        }

        let gauges = [
            (
                "pixeldesk_avg_response_ms",
                "Average processing time of successful requests",
                self.avg_response_ms,
            ),
            (
                "pixeldesk_circuit_open",
                "Whether the circuit breaker is open",
                if circuit_open { 1.0 } else { 0.0 },
            ),
            ("pixeldesk_cache_entries", "Entries in the response cache", cache_entries as f64),
            ("pixeldesk_pending_requests", "Admitted requests in flight", pending as f64),
        ];
        for (name, help, value) in gauges {
            let _ = write!(out, "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n");
        }
        out
    }
}
