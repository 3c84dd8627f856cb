//! Hybrid anomaly decision
//!
//! Strict precedence, first match wins:
//!
//! 1. An edge-reported score decides outright: anomaly iff score >= 0.5.
//!    Edge models run with richer temporal context and lower latency, so
//!    their verdict is trusted when present.
//! 2. Otherwise the hard physiological band: anomaly iff heart rate is
//!    above 150 or below 40 BPM. This safety net never depends on model
//!    availability.
//! 3. Otherwise: not anomalous.
//!
//! This is a policy, not a statistical fusion; the scores are never blended.
//! The cloud model's verdict lives on its own scoring route and does not
//! participate here.

use std::collections::HashMap;

pub const HEART_RATE_CHANNEL: &str = "heartRate";

/// Edge confidence at or above this is anomalous
pub const EDGE_SCORE_CUTOFF: f64 = 0.5;

/// Safe heart-rate band, BPM
pub const MAX_SAFE_HEART_RATE: f64 = 150.0;
pub const MIN_SAFE_HEART_RATE: f64 = 40.0;

/// Resolve the anomaly verdict for one reading.
///
/// `local_is_anomalous` is the device's own pre-flag; it is logged for
/// audit but carries no decision weight under the precedence above.
pub fn decide(
    metrics: &HashMap<String, f64>,
    edge_score: Option<f64>,
    local_is_anomalous: Option<bool>,
) -> bool {
    if local_is_anomalous == Some(true) {
        tracing::debug!("Edge pre-flag set on reading");
    }

    if let Some(score) = edge_score {
        if score.is_finite() {
            let anomalous = score >= EDGE_SCORE_CUTOFF;
            if anomalous {
                tracing::warn!(edge_score = score, "Anomaly detected via edge score");
            }
            return anomalous;
        }
    }

    if let Some(&heart_rate) = metrics.get(HEART_RATE_CHANNEL) {
        if heart_rate > MAX_SAFE_HEART_RATE || heart_rate < MIN_SAFE_HEART_RATE {
            tracing::warn!(heart_rate, "Anomaly detected: heart rate outside safe band");
            return true;
        }
    }

    false
}
