//! Threshold/cool-down circuit breaker for upstream calls.
//!
//! Failures are counted on the request path. A periodic check opens the
//! circuit once the count exceeds the threshold; a separate timer closes it
//! after a fixed window and resets the count. There is no half-open probe.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::config::CircuitConfig;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
        }
    }
}

pub struct CircuitBreaker {
    open: AtomicBool,
    failures: AtomicU32,
    threshold: u32,
    check_interval: Duration,
    open_window: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, check_interval: Duration, open_window: Duration) -> Self {
        Self {
            open: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            threshold,
            check_interval,
            open_window,
        }
    }

    pub fn from_config(config: &CircuitConfig) -> Self {
        Self::new(
            config.failure_threshold,
            Duration::from_secs(config.check_interval_secs),
            Duration::from_secs(config.open_window_secs),
        )
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> CircuitState {
        if self.is_open() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// Count one upstream failure. Returns the new total.
    pub fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Open the circuit if the failure count exceeds the threshold.
    ///
    /// Returns `true` only on the closed-to-open transition, so a check
    /// while already open never schedules a second close.
    pub fn check(&self) -> bool {
        if self.failure_count() <= self.threshold {
            return false;
        }
        self.open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Close the circuit and reset the failure count.
    pub fn close(&self) {
        self.failures.store(0, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }

    /// Run the periodic check forever, closing each trip after the open window.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if self.check() {
                tracing::warn!(
                    failures = self.failure_count(),
                    open_secs = self.open_window.as_secs(),
                    "Circuit breaker opened"
                );
                let breaker = Arc::clone(&self);
                tokio::spawn(async move {
                    tokio::time::sleep(breaker.open_window).await;
                    breaker.close();
                    tracing::info!("Circuit breaker closed");
                });
            }
        }
    }
}
