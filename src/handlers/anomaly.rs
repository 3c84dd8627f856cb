//! Cloud-model scoring handler
//!
//! Direct route onto the outlier scorer, independent of ingestion. Feature
//! defaults are tolerated here: nothing on this path is persisted.

use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ml::scorer::{self, MetricSample, ScoreResult};
use crate::{AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    #[serde(default)]
    pub metrics: Vec<MetricSample>,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub results: Vec<ScoreResult>,
    pub timestamp: String,
    /// Raw-score decision boundary of the served model
    pub model_threshold: f64,
}

/// Score a batch of feature samples against the cached model
pub async fn score(
    State(state): State<AppState>,
    Json(req): Json<ScoreRequest>,
) -> AppResult<Json<ScoreResponse>> {
    if req.metrics.is_empty() {
        return Err(AppError::Validation(vec!["metrics".to_string()]));
    }

    let artifact = state.artifacts.get_artifact().await?;
    let results = scorer::score_batch(&artifact, &req.metrics);

    let anomalies = results.iter().filter(|r| r.is_anomaly).count();
    tracing::info!(
        scored = results.len(),
        anomalies,
        "Scored metrics batch"
    );

    Ok(Json(ScoreResponse {
        results,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        model_threshold: artifact.threshold,
    }))
}
