//! Health and status handlers

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
}

/// Public liveness probe
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    success: bool,
    status: &'static str,
    server_time: i64,
}

/// Authenticated status probe for device clients
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        status: "operational",
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}
