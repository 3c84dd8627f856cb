//! Ingestion handlers

use axum::{extract::State, Json};
use serde_json::Value;

use crate::error::AppError;
use crate::models::{IngestResponse, SyncResponse};
use crate::{ingest, AppResult, AppState};

/// Ingest a single reading
pub async fn single(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> AppResult<Json<IngestResponse>> {
    let outcome = ingest::ingest_single(state.store.as_ref(), &state.notifier, &body).await?;

    Ok(Json(IngestResponse {
        success: true,
        message: "Data ingested successfully".to_string(),
        anomaly_detected: outcome.anomaly_detected,
    }))
}

/// Ingest a batch of readings. Always answers with a summary; per-item
/// failures are reported in-band, never as a transport error.
pub async fn sync(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> AppResult<Json<SyncResponse>> {
    let items = body
        .as_array()
        .ok_or_else(|| AppError::Validation(vec!["body: expected array of readings".to_string()]))?;

    let summary = ingest::ingest_batch(state.store.as_ref(), &state.notifier, items).await;

    tracing::info!(
        success = summary.success_count,
        errors = summary.error_count,
        anomalies = summary.anomalies_detected,
        "Batch ingestion completed"
    );

    Ok(Json(SyncResponse {
        success: true,
        message: "Batch ingestion completed".to_string(),
        success_count: summary.success_count,
        error_count: summary.error_count,
        anomalies_detected: summary.anomalies_detected,
    }))
}
