//! PixelDesk chat proxy - forwards chat requests to local or cloud inference endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use pixeldesk_backend::{build_app, janitor, logging, AppState, Config, HttpUpstream};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    logging::init_tracing(&config.logging.level);
    logging::install_panic_hook();

    tracing::info!("Starting PixelDesk chat proxy");
    tracing::info!(
        models = ?config.models.keys().collect::<Vec<_>>(),
        default_model = %config.pipeline.default_model,
        batching = config.pipeline.batching,
        "Model registry loaded"
    );
    if config.upstream.api_key.is_none() {
        tracing::warn!("No cloud API key configured; cloud models will fail");
    }

    let upstream = Arc::new(HttpUpstream::new(&config.upstream));
    let state = Arc::new(AppState::new(config.clone(), upstream));

    let _tasks = janitor::spawn_background_tasks(&state);

    let app = build_app(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
