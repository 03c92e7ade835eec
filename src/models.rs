//! Shared API models

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub sessions: u64,
}

/// Relay status (GET /api/status)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStatus {
    pub device_type: String,
    pub firmware_version: String,
    pub capture_enabled: bool,
    pub capture_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub overlap_policy: String,
    pub sessions: u64,
}

/// Request body for POST /api/test/publish
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub artifact_id: String,
}
