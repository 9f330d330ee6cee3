pub mod batch;
pub mod cache;
pub mod circuit;
pub mod config;
pub mod error;
pub mod janitor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod registry;
pub mod routes;
pub mod test_util;
pub mod upstream;
pub mod validate;

pub use batch::{BatchItem, BatchQueue, BatchQueueConfig};
pub use cache::ResponseCache;
pub use circuit::{CircuitBreaker, CircuitState};
pub use config::{Config, ConfigError};
pub use error::{ErrorReply, ProxyError};
pub use pipeline::ChatPipeline;
pub use registry::ModelRegistry;
pub use upstream::{HttpUpstream, Upstream, UpstreamError};

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::{SetResponseHeader, SetResponseHeaderLayer};
use tower_http::trace::TraceLayer;

use crate::rate_limit::{build_limiter, ClientRateLimiter};

/// Shared application state, built once by the process entry point.
pub struct AppState {
    pub config: Config,
    /// Admission, cache, circuit breaker and batching.
    pub pipeline: ChatPipeline,
    /// Per-client quota for `/api/chat` (if enabled).
    pub rate_limiter: Option<Arc<ClientRateLimiter>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, upstream: Arc<dyn Upstream>) -> Self {
        let pipeline = ChatPipeline::new(&config, upstream);
        let rate_limiter = build_limiter(&config.rate_limit);
        Self {
            config,
            pipeline,
            rate_limiter,
            started_at: Utc::now(),
        }
    }
}

/// Build the full HTTP application: API routes, static assets and layers.
///
/// Every response carries baseline security headers unless a handler set its own.
pub fn build_app(state: Arc<AppState>) -> Router {
    let assets = SetResponseHeader::if_not_present(
        ServeDir::new(&state.config.server.static_dir),
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=86400"),
    );

    Router::new()
        .merge(routes::health::router(state.clone()))
        .merge(routes::models::router(state.clone()))
        .merge(routes::chat::router(state))
        .fallback_service(assets)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(middleware::from_fn(logging::request_logger))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
