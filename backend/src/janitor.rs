//! Periodic maintenance running beside the request path.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::ResponseCache;
use crate::rate_limit::ClientRateLimiter;
use crate::AppState;

/// Spawn the cache sweeper, memory monitor and circuit check.
pub fn spawn_background_tasks(state: &Arc<AppState>) -> Vec<JoinHandle<()>> {
    let pipeline = &state.pipeline;
    let cache_config = &state.config.cache;

    vec![
        tokio::spawn(run_cache_sweeper(pipeline.cache().clone())),
        tokio::spawn(run_memory_monitor(
            pipeline.cache().clone(),
            state.rate_limiter.clone(),
            cache_config.memory_check_interval(),
            cache_config.memory_threshold_bytes(),
        )),
        tokio::spawn(pipeline.circuit().clone().run()),
    ]
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Drop expired cache entries once per TTL.
pub async fn run_cache_sweeper(cache: Arc<ResponseCache>) {
    let mut interval = ticker(cache.ttl());
    interval.tick().await;
    loop {
        interval.tick().await;
        let removed = cache.sweep().await;
        if removed > 0 {
            tracing::info!(removed, "Swept expired cache entries");
        }
    }
}

/// Clear the whole cache whenever resident memory crosses `threshold_bytes`.
pub async fn run_memory_monitor(
    cache: Arc<ResponseCache>,
    limiter: Option<Arc<ClientRateLimiter>>,
    period: Duration,
    threshold_bytes: u64,
) {
    let mut interval = ticker(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        relieve_memory_pressure(&cache, resident_memory_bytes(), threshold_bytes).await;
        if let Some(limiter) = &limiter {
            limiter.retain_recent();
        }
    }
}

/// Clear the cache if `usage` exceeds the threshold. Returns whether it did.
pub async fn relieve_memory_pressure(
    cache: &ResponseCache,
    usage: Option<u64>,
    threshold_bytes: u64,
) -> bool {
    match usage {
        Some(bytes) if bytes > threshold_bytes => {
            let cleared = cache.clear().await;
            tracing::info!(
                resident_mb = bytes / (1024 * 1024),
                cleared,
                "Memory pressure, cleared response cache"
            );
            true
        }
        _ => false,
    }
}

/// Resident set size of this process, where the platform exposes it.
pub fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let rest = line.strip_prefix("VmRSS:")?;
        let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
        Some(kb * 1024)
    })
}
