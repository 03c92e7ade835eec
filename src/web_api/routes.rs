//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use tower_http::services::ServeDir;

use crate::models::{ApiResponse, PublishRequest};
use crate::state::AppState;

/// Create router
pub fn create_router(state: AppState) -> Router {
    let images = ServeDir::new(&state.config.images_dir);

    Router::new()
        // Observer page
        .route("/", get(index))
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::relay_status))
        // Test API for E2E testing (bypasses the settle delay)
        .route("/api/test/publish", post(publish_test_artifact))
        // WebSocket
        .route("/ws", get(websocket_handler))
        // Captured stills
        .nest_service("/images", images)
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    Html(super::page::INDEX_HTML)
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection (one observer session)
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Register with RealtimeHub, the welcome is already queued on rx
    let (conn_id, mut rx) = state.realtime.register().await;

    tracing::info!(connection_id = %conn_id, "WebSocket client connected");

    // Forward hub frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Observers send nothing meaningful; watch for close
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Ping(data)) => {
                    // Pong is handled automatically by axum
                    tracing::trace!("Received ping: {:?}", data);
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete, then stop the other
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.realtime.unregister(&conn_id).await;
}

// ========================================
// Test API (E2E testing)
// ========================================

/// Publish an artifact id directly through the hub
/// POST /api/test/publish
async fn publish_test_artifact(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> Result<impl IntoResponse, crate::Error> {
    let artifact_id = req.artifact_id.trim();
    if artifact_id.is_empty() {
        return Err(crate::Error::Validation("artifact_id must not be empty".to_string()));
    }

    let report = state.realtime.publish(artifact_id).await;

    tracing::info!(
        artifact_id = %artifact_id,
        delivered = report.delivered,
        "[TEST] Artifact broadcast via WebSocket"
    );

    Ok(Json(ApiResponse::success(report)))
}
