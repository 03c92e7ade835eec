//! WebAPI - Observer Page, WebSocket and Status Endpoints
//!
//! ## Responsibilities
//!
//! - Observer page and persistent connection endpoint
//! - One observer session per WebSocket
//! - Health and relay status

mod page;
mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::{HealthResponse, RelayStatus};
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        sessions: state.realtime.connection_count(),
    };

    Json(response)
}

/// Status endpoint
pub async fn relay_status(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.config;
    Json(RelayStatus {
        device_type: "raspicam".to_string(),
        firmware_version: env!("CARGO_PKG_VERSION").to_string(),
        capture_enabled: config.capture_enabled,
        capture_interval_ms: config.capture_interval_ms,
        settle_delay_ms: config.settle_delay_ms,
        overlap_policy: config.overlap_policy.to_string(),
        sessions: state.realtime.connection_count(),
    })
}
