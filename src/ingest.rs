//! Ingestion orchestration
//!
//! Per record: Received -> Validated -> Persisted -> Scored -> (Flagged |
//! Unflagged). Batches iterate records independently; one record's failure
//! is absorbed into the summary and never halts the batch.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::decision;
use crate::error::{AppError, AppResult};
use crate::ml::features::{self, DEFAULT_FEATURE_ORDER};
use crate::models::{HealthMetric, IngestRecord, MetricStore};
use crate::notify::Notifier;

/// Outcome of one successful ingestion
#[derive(Debug, Clone, Copy)]
pub struct IngestOutcome {
    pub anomaly_detected: bool,
}

/// Per-batch tally. Derived, recomputed per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub success_count: u32,
    pub error_count: u32,
    pub anomalies_detected: u32,
}

/// Ingest a single reading: validate, persist, decide, flag and notify on a
/// positive verdict.
pub async fn ingest_single(
    store: &dyn MetricStore,
    notifier: &Arc<dyn Notifier>,
    body: &Value,
) -> AppResult<IngestOutcome> {
    let record = IngestRecord::from_value(body)?;

    // No defaulting on this path: an absent channel must fail here, not be
    // substituted into a decision that ends up as a persisted anomaly flag.
    if let Err(missing) = features::extract_strict(&record.metrics, &DEFAULT_FEATURE_ORDER) {
        return Err(AppError::Validation(
            missing.into_iter().map(|c| format!("metrics.{c}")).collect(),
        ));
    }

    let local_pre_flag = record.is_anomalous;

    let metric = record.into_metric(Utc::now().timestamp_millis());
    store.put(&metric).await?;
    tracing::info!(
        user_id = %metric.user_id,
        timestamp = metric.timestamp,
        "Stored metric"
    );

    let anomaly_detected = decision::decide(
        &metric.metrics,
        metric.edge_anomaly_score,
        Some(local_pre_flag),
    );

    if anomaly_detected {
        // the verdict stands even if the flag update cannot be written
        if let Err(e) = store.mark_anomalous(&metric.user_id, metric.timestamp).await {
            tracing::error!(
                user_id = %metric.user_id,
                timestamp = metric.timestamp,
                "Failed to persist anomaly flag: {}",
                e
            );
        }

        dispatch_alert(notifier, &metric);
    }

    Ok(IngestOutcome { anomaly_detected })
}

/// Ingest a batch sequentially with per-item isolation. Always returns a
/// summary; individual failures only increment `error_count`.
pub async fn ingest_batch(
    store: &dyn MetricStore,
    notifier: &Arc<dyn Notifier>,
    items: &[Value],
) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for item in items {
        match ingest_single(store, notifier, item).await {
            Ok(outcome) => {
                summary.success_count += 1;
                if outcome.anomaly_detected {
                    summary.anomalies_detected += 1;
                }
            }
            Err(e) => {
                tracing::error!("Error ingesting item: {}", e);
                summary.error_count += 1;
            }
        }
    }

    summary
}

/// Fire-and-forget alert dispatch; delivery shares no fate with the request.
fn dispatch_alert(notifier: &Arc<dyn Notifier>, metric: &HealthMetric) {
    let notifier = Arc::clone(notifier);
    let user_id = metric.user_id.clone();
    let metrics: HashMap<String, f64> = metric.metrics.clone();

    tokio::spawn(async move {
        notifier.anomaly_alert(&user_id, &metrics).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::store::testing::MemoryMetricStore;
    use crate::notify::testing::RecordingNotifier;
    use serde_json::json;

    fn body(user: &str, ts: i64, heart_rate: f64) -> Value {
        json!({
            "userId": user,
            "timestamp": ts,
            "deviceId": "watch-7",
            "metrics": {"heartRate": heart_rate, "steps": 120.0, "calories": 30.0, "distance": 0.4}
        })
    }

    fn doubles() -> (MemoryMetricStore, Arc<RecordingNotifier>, Arc<dyn Notifier>) {
        let store = MemoryMetricStore::default();
        let recorder = Arc::new(RecordingNotifier::default());
        let notifier: Arc<dyn Notifier> = recorder.clone();
        (store, recorder, notifier)
    }

    #[tokio::test]
    async fn valid_record_is_persisted_and_retrievable_by_key() {
        let (store, _, notifier) = doubles();

        let outcome = ingest_single(&store, &notifier, &body("user-1", 1000, 72.0))
            .await
            .unwrap();
        assert!(!outcome.anomaly_detected);

        let stored = store.get("user-1", 1000).await.unwrap().unwrap();
        assert_eq!(stored.device_id, "watch-7");
        assert_eq!(stored.metrics["heartRate"], 72.0);
        assert!(stored.received_at > 0);
        assert!(!stored.anomaly_detected);
    }

    #[tokio::test]
    async fn invalid_record_is_rejected_before_any_write() {
        let (store, _, notifier) = doubles();

        let err = ingest_single(&store, &notifier, &json!({"timestamp": 1000}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn absent_channels_are_rejected_not_defaulted() {
        let (store, _, notifier) = doubles();

        let mut payload = body("user-1", 1000, 72.0);
        payload["metrics"].as_object_mut().unwrap().remove("steps");
        payload["metrics"].as_object_mut().unwrap().remove("distance");

        let err = ingest_single(&store, &notifier, &payload).await.unwrap_err();
        match err {
            AppError::Validation(fields) => {
                assert_eq!(fields, vec!["metrics.steps", "metrics.distance"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn anomalous_record_is_flagged_and_alerted() {
        let (store, recorder, notifier) = doubles();

        let outcome = ingest_single(&store, &notifier, &body("user-1", 1000, 160.0))
            .await
            .unwrap();
        assert!(outcome.anomaly_detected);

        let stored = store.get("user-1", 1000).await.unwrap().unwrap();
        assert!(stored.anomaly_detected);

        // alert dispatch is spawned; yield until it lands
        for _ in 0..50 {
            if !recorder.alerts.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let alerts = recorder.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, "user-1");
    }

    #[tokio::test]
    async fn edge_score_overrides_normal_heart_rate() {
        let (store, _, notifier) = doubles();

        let mut payload = body("user-1", 1000, 70.0);
        payload["edgeAnomalyScore"] = json!(0.7);

        let outcome = ingest_single(&store, &notifier, &payload).await.unwrap();
        assert!(outcome.anomaly_detected);
        assert!(store.get("user-1", 1000).await.unwrap().unwrap().anomaly_detected);
    }

    #[tokio::test]
    async fn batch_isolates_the_failing_item() {
        let (store, _, notifier) = doubles();

        let mut items: Vec<Value> = (0..5).map(|i| body("user-1", 1000 + i, 72.0)).collect();
        items[2].as_object_mut().unwrap().remove("deviceId");

        let summary = ingest_batch(&store, &notifier, &items).await;
        assert_eq!(summary.success_count, 4);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.anomalies_detected, 0);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn batch_counts_anomalies_only_for_successful_items() {
        let (store, _, notifier) = doubles();

        let items = vec![
            body("user-1", 1, 72.0),
            body("user-1", 2, 160.0),
            json!({"userId": "user-1"}),
            body("user-1", 3, 30.0),
        ];

        let summary = ingest_batch(&store, &notifier, &items).await;
        assert_eq!(summary.success_count, 3);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.anomalies_detected, 2);
    }

    #[tokio::test]
    async fn batch_of_only_failures_still_returns_a_summary() {
        let (store, _, notifier) = doubles();

        let items = vec![json!({}), json!({})];
        let summary = ingest_batch(&store, &notifier, &items).await;
        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.error_count, 2);
        assert_eq!(store.len().await, 0);
    }
}
