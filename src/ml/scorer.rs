//! Outlier scoring
//!
//! Evaluates the cached model on normalized feature vectors. The anomaly
//! decision is always threshold-based on the raw score (higher = more
//! normal, matching the model's native semantics). The sigmoid-squashed
//! display score exists for reporting only and is never decision-bearing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::ml::artifact::ModelArtifact;
use crate::ml::features::{self, DEFAULT_FEATURE_ORDER};

/// One sample on the scoring-only boundary (snake_case wire names)
#[derive(Debug, Clone, Deserialize)]
pub struct MetricSample {
    #[serde(default)]
    pub metric_id: String,
    pub heart_rate: Option<f64>,
    pub steps: Option<f64>,
    pub calories: Option<f64>,
    pub distance: Option<f64>,
}

impl MetricSample {
    /// Present channels under their canonical names.
    fn channels(&self) -> HashMap<String, f64> {
        let mut map = HashMap::new();
        if let Some(v) = self.heart_rate {
            map.insert("heartRate".to_string(), v);
        }
        if let Some(v) = self.steps {
            map.insert("steps".to_string(), v);
        }
        if let Some(v) = self.calories {
            map.insert("calories".to_string(), v);
        }
        if let Some(v) = self.distance {
            map.insert("distance".to_string(), v);
        }
        map
    }
}

/// Per-sample scoring result. Transient; returned to the caller, never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreResult {
    pub metric_id: String,
    pub is_anomaly: bool,
    /// Display score in [0,1]
    pub cloud_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Raw model evaluation of one normalized vector.
#[derive(Debug, Clone, Copy)]
pub struct ScoreOutcome {
    pub raw_score: f64,
    pub display_score: f64,
    pub is_anomaly: bool,
}

/// Score one feature vector against the cached artifact.
pub fn score_vector(artifact: &ModelArtifact, features: &[f64]) -> AppResult<ScoreOutcome> {
    let scaled = artifact.scaler.transform(features)?;
    let raw = artifact.model.raw_score(&scaled)?;

    Ok(ScoreOutcome {
        raw_score: raw,
        display_score: sigmoid(raw),
        is_anomaly: raw < artifact.threshold,
    })
}

/// Score a batch of samples, one result per input. A sample that fails
/// extraction or evaluation records its error and a neutral display score;
/// the remaining samples are still scored.
pub fn score_batch(artifact: &ModelArtifact, samples: &[MetricSample]) -> Vec<ScoreResult> {
    samples
        .iter()
        .map(|sample| {
            let vector = features::extract_with_defaults(&sample.channels(), &DEFAULT_FEATURE_ORDER);
            match score_vector(artifact, &vector) {
                Ok(outcome) => ScoreResult {
                    metric_id: sample.metric_id.clone(),
                    is_anomaly: outcome.is_anomaly,
                    cloud_score: outcome.display_score,
                    error: None,
                },
                Err(e) => {
                    tracing::error!(metric_id = %sample.metric_id, "Scoring failed: {}", e);
                    ScoreResult {
                        metric_id: sample.metric_id.clone(),
                        is_anomaly: false,
                        cloud_score: 0.5,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect()
}

/// Logistic squashing of a raw score into [0,1], for display only.
pub fn sigmoid(raw: f64) -> f64 {
    1.0 / (1.0 + (-raw).exp())
}
