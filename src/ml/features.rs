//! Feature extraction
//!
//! Maps a reading's metric channels to the fixed-order vector the models
//! were fitted on. The ingestion path is strict: absent channels are an
//! error naming every missing one, because silently defaulting would
//! corrupt persisted anomaly flags. Scoring-only and synthetic paths
//! tolerate absences and substitute documented defaults.

use std::collections::HashMap;

/// Fitted feature order, matching the training pipeline
pub const DEFAULT_FEATURE_ORDER: [&str; 4] = ["heartRate", "steps", "calories", "distance"];

/// Default substituted for an absent heart-rate channel (resting adult BPM)
pub const DEFAULT_HEART_RATE: f64 = 70.0;

/// Extract channels in `order`, failing with the names of every absent one.
pub fn extract_strict(
    metrics: &HashMap<String, f64>,
    order: &[&str],
) -> Result<Vec<f64>, Vec<String>> {
    let mut vector = Vec::with_capacity(order.len());
    let mut missing = Vec::new();

    for channel in order {
        match metrics.get(*channel) {
            Some(value) => vector.push(*value),
            None => missing.push(channel.to_string()),
        }
    }

    if missing.is_empty() {
        Ok(vector)
    } else {
        Err(missing)
    }
}

/// Extract channels in `order`, substituting defaults for absent ones:
/// 70 for heartRate, 0 for count-like channels.
pub fn extract_with_defaults(metrics: &HashMap<String, f64>, order: &[&str]) -> Vec<f64> {
    order
        .iter()
        .map(|channel| {
            metrics
                .get(*channel)
                .copied()
                .unwrap_or_else(|| default_for(channel))
        })
        .collect()
}

fn default_for(channel: &str) -> f64 {
    if channel == "heartRate" {
        DEFAULT_HEART_RATE
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn strict_extraction_preserves_order() {
        let m = metrics(&[
            ("steps", 120.0),
            ("heartRate", 72.0),
            ("distance", 0.4),
            ("calories", 30.0),
        ]);
        let v = extract_strict(&m, &DEFAULT_FEATURE_ORDER).unwrap();
        assert_eq!(v, vec![72.0, 120.0, 30.0, 0.4]);
    }

    #[test]
    fn strict_extraction_names_every_missing_channel() {
        let m = metrics(&[("heartRate", 72.0)]);
        let missing = extract_strict(&m, &DEFAULT_FEATURE_ORDER).unwrap_err();
        assert_eq!(missing, vec!["steps", "calories", "distance"]);
    }

    #[test]
    fn defaulting_extraction_substitutes_documented_values() {
        let m = metrics(&[("steps", 500.0)]);
        let v = extract_with_defaults(&m, &DEFAULT_FEATURE_ORDER);
        assert_eq!(v, vec![DEFAULT_HEART_RATE, 500.0, 0.0, 0.0]);
    }
}
