//! Capture Relay - main entry point

use capture_relay::{
    capture_source::CaptureSource,
    realtime_hub::RealtimeHub,
    settle_scheduler::SettleScheduler,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Capacity of the CaptureSource -> SettleScheduler channel
const CAPTURE_CHANNEL_CAPACITY: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capture_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Capture Relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(
        images_dir = %config.images_dir.display(),
        capture_interval_ms = config.capture_interval_ms,
        settle_delay_ms = config.settle_delay_ms,
        overlap_policy = %config.overlap_policy,
        capture_program = %config.capture_program,
        capture_enabled = config.capture_enabled,
        "Configuration loaded"
    );

    let realtime = Arc::new(RealtimeHub::new());

    // Capture -> settle pipeline
    let (capture_tx, capture_rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);

    SettleScheduler::new(realtime.clone(), config.settle_delay(), config.overlap_policy)
        .spawn(capture_rx);
    tracing::info!("SettleScheduler started");

    let capture = Arc::new(CaptureSource::new(config.capture_config(), capture_tx).await?);
    if config.capture_enabled {
        capture.start().await;
        tracing::info!("CaptureSource started");
    } else {
        tracing::info!("CaptureSource disabled (CAPTURE_ENABLED=false)");
    }

    let state = AppState::new(config, realtime);

    let app = web_api::create_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
