//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create tables if not exist
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Telemetry readings, keyed by (user_id, timestamp).
-- Metric channels and scores are stored as exact numerics: JSONB numbers
-- are arbitrary-precision in Postgres, score columns are NUMERIC.
CREATE TABLE IF NOT EXISTS health_metrics (
    user_id VARCHAR(128) NOT NULL,
    timestamp BIGINT NOT NULL,
    device_id VARCHAR(128) NOT NULL,
    metrics JSONB NOT NULL,
    received_at BIGINT NOT NULL,
    anomaly_detected BOOLEAN NOT NULL DEFAULT false,
    local_anomaly_score NUMERIC,
    edge_anomaly_score NUMERIC,
    activity_state VARCHAR(64),
    model_version VARCHAR(64),
    PRIMARY KEY (user_id, timestamp)
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_health_metrics_received ON health_metrics(user_id, received_at);
CREATE INDEX IF NOT EXISTS idx_health_metrics_anomaly ON health_metrics(user_id) WHERE anomaly_detected;
"#;
