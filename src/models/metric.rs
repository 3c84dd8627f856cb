//! Telemetry record model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// One persisted telemetry reading, keyed by (user_id, timestamp).
///
/// `received_at` is stamped server-side and never client-supplied.
/// `anomaly_detected` starts false and flips to true at most once, after
/// decisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetric {
    pub user_id: String,
    /// Reading time, epoch millis
    pub timestamp: i64,
    pub device_id: String,
    /// Named numeric channels (heartRate, steps, calories, distance, ...)
    pub metrics: HashMap<String, f64>,
    /// Server ingestion time, epoch millis
    pub received_at: i64,
    pub anomaly_detected: bool,
    pub local_anomaly_score: Option<f64>,
    pub edge_anomaly_score: Option<f64>,
    pub activity_state: Option<String>,
    pub model_version: Option<String>,
}

/// Validated single-ingestion payload.
///
/// Parsed from the raw request body against an explicit schema so that a
/// rejection can name every missing required field at once.
#[derive(Debug, Clone)]
pub struct IngestRecord {
    pub user_id: String,
    pub timestamp: i64,
    pub device_id: String,
    pub metrics: HashMap<String, f64>,
    /// Edge pre-flag; advisory, recorded but not decision-bearing
    pub is_anomalous: bool,
    pub local_anomaly_score: Option<f64>,
    pub edge_anomaly_score: Option<f64>,
    pub activity_state: Option<String>,
    pub model_version: Option<String>,
}

impl IngestRecord {
    /// Validate a raw ingestion body. Required: userId, timestamp, deviceId,
    /// metrics (an object of numeric channels). The error names every field
    /// that is absent or of the wrong type.
    pub fn from_value(body: &Value) -> Result<Self, AppError> {
        let obj = body
            .as_object()
            .ok_or_else(|| AppError::Validation(vec!["body: expected object".to_string()]))?;

        let mut problems = Vec::new();

        let user_id = match obj.get("userId").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => Some(s.to_string()),
            Some(_) => {
                problems.push("userId: expected non-empty string".to_string());
                None
            }
            None => {
                problems.push("userId".to_string());
                None
            }
        };

        let timestamp = match obj.get("timestamp") {
            Some(v) => match v.as_i64() {
                Some(t) => Some(t),
                None => {
                    problems.push("timestamp: expected integer epoch millis".to_string());
                    None
                }
            },
            None => {
                problems.push("timestamp".to_string());
                None
            }
        };

        let device_id = match obj.get("deviceId").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => Some(s.to_string()),
            Some(_) => {
                problems.push("deviceId: expected non-empty string".to_string());
                None
            }
            None => {
                problems.push("deviceId".to_string());
                None
            }
        };

        let metrics = match obj.get("metrics") {
            Some(v) => match numeric_map(v) {
                Some(m) => Some(m),
                None => {
                    problems.push("metrics: expected object of numeric channels".to_string());
                    None
                }
            },
            None => {
                problems.push("metrics".to_string());
                None
            }
        };

        match (user_id, timestamp, device_id, metrics) {
            (Some(user_id), Some(timestamp), Some(device_id), Some(metrics))
                if problems.is_empty() =>
            {
                Ok(Self {
                    user_id,
                    timestamp,
                    device_id,
                    metrics,
                    is_anomalous: obj.get("isAnomalous").and_then(Value::as_bool).unwrap_or(false),
                    local_anomaly_score: lenient_f64(obj.get("localAnomalyScore")),
                    edge_anomaly_score: lenient_f64(obj.get("edgeAnomalyScore")),
                    activity_state: obj
                        .get("activityState")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    model_version: obj
                        .get("modelVersion")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            }
            _ => Err(AppError::Validation(problems)),
        }
    }

    /// Build the record to persist, with the server-stamped receive time.
    /// The anomaly flag starts false; decisioning may flip it later.
    pub fn into_metric(self, received_at: i64) -> HealthMetric {
        HealthMetric {
            user_id: self.user_id,
            timestamp: self.timestamp,
            device_id: self.device_id,
            metrics: self.metrics,
            received_at,
            anomaly_detected: false,
            local_anomaly_score: self.local_anomaly_score,
            edge_anomaly_score: self.edge_anomaly_score,
            activity_state: self.activity_state,
            model_version: self.model_version,
        }
    }
}

fn numeric_map(value: &Value) -> Option<HashMap<String, f64>> {
    let obj = value.as_object()?;
    let mut map = HashMap::with_capacity(obj.len());
    for (k, v) in obj {
        map.insert(k.clone(), v.as_f64()?);
    }
    Some(map)
}

/// Optional score fields arrive as numbers or numeric strings from older
/// device firmware; anything unparseable is treated as absent.
fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Exact decimal form of a float for the store's NUMERIC columns: the
/// shortest decimal string that round-trips, never the binary expansion.
pub fn decimal_string(value: f64) -> String {
    format!("{}", value)
}

/// Single-ingestion response envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
    pub anomaly_detected: bool,
}

/// Batch-ingestion response envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    pub success_count: u32,
    pub error_count: u32,
    pub anomalies_detected: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_body() -> Value {
        json!({
            "userId": "user-1",
            "timestamp": 1700000000000i64,
            "deviceId": "watch-7",
            "metrics": {"heartRate": 72.5, "steps": 120.0, "calories": 30.0, "distance": 0.4}
        })
    }

    #[test]
    fn valid_body_parses() {
        let record = IngestRecord::from_value(&valid_body()).unwrap();
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.timestamp, 1700000000000);
        assert_eq!(record.metrics["heartRate"], 72.5);
        assert!(!record.is_anomalous);
    }

    #[test]
    fn missing_fields_are_all_named() {
        let err = IngestRecord::from_value(&json!({"timestamp": 1i64})).unwrap_err();
        match err {
            AppError::Validation(fields) => {
                assert_eq!(fields, vec!["userId", "deviceId", "metrics"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_metric_channel_is_rejected() {
        let mut body = valid_body();
        body["metrics"]["heartRate"] = json!("high");
        let err = IngestRecord::from_value(&body).unwrap_err();
        match err {
            AppError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert!(fields[0].starts_with("metrics"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn edge_score_accepts_numeric_strings() {
        let mut body = valid_body();
        body["edgeAnomalyScore"] = json!("0.7");
        let record = IngestRecord::from_value(&body).unwrap();
        assert_eq!(record.edge_anomaly_score, Some(0.7));
    }

    #[test]
    fn unparseable_edge_score_is_treated_as_absent() {
        let mut body = valid_body();
        body["edgeAnomalyScore"] = json!("n/a");
        let record = IngestRecord::from_value(&body).unwrap();
        assert_eq!(record.edge_anomaly_score, None);
    }

    #[test]
    fn persisted_record_starts_unflagged_and_stamps_receive_time() {
        let metric = IngestRecord::from_value(&valid_body())
            .unwrap()
            .into_metric(1700000000999);
        assert!(!metric.anomaly_detected);
        assert_eq!(metric.received_at, 1700000000999);
    }

    #[test]
    fn decimal_string_is_shortest_roundtrip_form() {
        assert_eq!(decimal_string(0.1), "0.1");
        assert_eq!(decimal_string(72.5), "72.5");
        assert_eq!(decimal_string(1500.0), "1500");
    }
}
