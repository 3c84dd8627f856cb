//! Metric store - opaque put/update/get-by-key persistence

use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::metric::{decimal_string, HealthMetric};

/// Table-store collaborator for telemetry readings. Keys are
/// (user_id, timestamp); floats cross this seam in exact decimal form.
#[async_trait::async_trait]
pub trait MetricStore: Send + Sync {
    async fn put(&self, metric: &HealthMetric) -> AppResult<()>;
    async fn mark_anomalous(&self, user_id: &str, timestamp: i64) -> AppResult<()>;
    async fn get(&self, user_id: &str, timestamp: i64) -> AppResult<Option<HealthMetric>>;
}

/// Postgres-backed store
pub struct PgMetricStore {
    pool: PgPool,
}

impl PgMetricStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MetricRow {
    user_id: String,
    timestamp: i64,
    device_id: String,
    metrics: sqlx::types::Json<std::collections::HashMap<String, f64>>,
    received_at: i64,
    anomaly_detected: bool,
    local_anomaly_score: Option<f64>,
    edge_anomaly_score: Option<f64>,
    activity_state: Option<String>,
    model_version: Option<String>,
}

impl From<MetricRow> for HealthMetric {
    fn from(row: MetricRow) -> Self {
        HealthMetric {
            user_id: row.user_id,
            timestamp: row.timestamp,
            device_id: row.device_id,
            metrics: row.metrics.0,
            received_at: row.received_at,
            anomaly_detected: row.anomaly_detected,
            local_anomaly_score: row.local_anomaly_score,
            edge_anomaly_score: row.edge_anomaly_score,
            activity_state: row.activity_state,
            model_version: row.model_version,
        }
    }
}

#[async_trait::async_trait]
impl MetricStore for PgMetricStore {
    async fn put(&self, metric: &HealthMetric) -> AppResult<()> {
        // JSONB numbers are arbitrary-precision; the score columns take the
        // decimal string form through a NUMERIC cast
        sqlx::query(
            r#"
            INSERT INTO health_metrics
                (user_id, timestamp, device_id, metrics, received_at, anomaly_detected,
                 local_anomaly_score, edge_anomaly_score, activity_state, model_version)
            VALUES ($1, $2, $3, $4, $5, $6, $7::numeric, $8::numeric, $9, $10)
            ON CONFLICT (user_id, timestamp) DO UPDATE SET
                device_id = EXCLUDED.device_id,
                metrics = EXCLUDED.metrics,
                received_at = EXCLUDED.received_at,
                anomaly_detected = EXCLUDED.anomaly_detected,
                local_anomaly_score = EXCLUDED.local_anomaly_score,
                edge_anomaly_score = EXCLUDED.edge_anomaly_score,
                activity_state = EXCLUDED.activity_state,
                model_version = EXCLUDED.model_version
            "#,
        )
        .bind(&metric.user_id)
        .bind(metric.timestamp)
        .bind(&metric.device_id)
        .bind(sqlx::types::Json(&metric.metrics))
        .bind(metric.received_at)
        .bind(metric.anomaly_detected)
        .bind(metric.local_anomaly_score.map(decimal_string))
        .bind(metric.edge_anomaly_score.map(decimal_string))
        .bind(&metric.activity_state)
        .bind(&metric.model_version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_anomalous(&self, user_id: &str, timestamp: i64) -> AppResult<()> {
        sqlx::query(
            "UPDATE health_metrics SET anomaly_detected = true WHERE user_id = $1 AND timestamp = $2",
        )
        .bind(user_id)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, user_id: &str, timestamp: i64) -> AppResult<Option<HealthMetric>> {
        let row = sqlx::query_as::<_, MetricRow>(
            r#"
            SELECT user_id, timestamp, device_id, metrics, received_at, anomaly_detected,
                   local_anomaly_score::float8 AS local_anomaly_score,
                   edge_anomaly_score::float8 AS edge_anomaly_score,
                   activity_state, model_version
            FROM health_metrics
            WHERE user_id = $1 AND timestamp = $2
            "#,
        )
        .bind(user_id)
        .bind(timestamp)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(HealthMetric::from))
    }
}
