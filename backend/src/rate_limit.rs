//! Per-client request quota in front of the chat endpoint.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::config::RateLimitConfig;
use crate::error::ProxyError;
use crate::AppState;

pub type ClientRateLimiter = DefaultKeyedRateLimiter<IpAddr>;

/// Build the keyed limiter, or `None` when limiting is disabled.
///
/// The quota refills one request every `window / max_requests` with a burst
/// of `max_requests`, so a quiet client gets the full allowance per window.
pub fn build_limiter(config: &RateLimitConfig) -> Option<Arc<ClientRateLimiter>> {
    if !config.enabled {
        return None;
    }
    let burst = NonZeroU32::new(config.max_requests)?;
    let period = Duration::from_secs(config.window_secs) / config.max_requests;
    let quota = Quota::with_period(period)?.allow_burst(burst);
    Some(Arc::new(RateLimiter::keyed(quota)))
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Middleware rejecting clients that exhausted their quota.
pub async fn enforce_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        let client = client_ip(&request);
        if limiter.check_key(&client).is_err() {
            tracing::debug!(client = %client, "Rate limit exceeded");
            return ProxyError::Backpressure
                .into_reply(false)
                .into_response();
        }
    }
    next.run(request).await
}
