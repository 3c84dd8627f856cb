//! HealthPulse Cloud Backend Server
//!
//! Ingestion and anomaly-scoring backend for wearable health telemetry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     HEALTHPULSE CLOUD                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌──────────────┐  ┌───────────────────────┐ │
//! │  │  API      │  │  Ingestion   │  │  Model Serving        │ │
//! │  │  Gateway  │  │  Pipeline    │  │  (artifact cache +    │ │
//! │  │  (Axum)   │  │  (validate / │  │   outlier scorer)     │ │
//! │  │           │  │   decide)    │  │                       │ │
//! │  └─────┬─────┘  └──────┬───────┘  └───────────┬───────────┘ │
//! │        └───────────────┼──────────────────────┘             │
//! │                        ▼                                    │
//! │        ┌─────────────┐   ┌──────────────┐                   │
//! │        │ PostgreSQL  │   │  Blob store  │                   │
//! │        │ (readings)  │   │  (artifacts) │                   │
//! │        └─────────────┘   └──────────────┘                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod decision;
mod error;
mod handlers;
mod ingest;
mod middleware;
mod ml;
mod models;
mod notify;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

use crate::ml::ArtifactCache;
use crate::models::{MetricStore, PgMetricStore};
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::storage::{BlobStore, FsBlobStore, HttpBlobStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "healthpulse_cloud=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing::info!("HealthPulse Cloud Server starting...");
    tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));

    // Initialize database pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    // Build application state
    let state = AppState::new(pool, config.clone());

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listener")?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetricStore>,
    pub notifier: Arc<dyn Notifier>,
    pub artifacts: Arc<ArtifactCache>,
    pub config: config::Config,
}

impl AppState {
    fn new(pool: sqlx::PgPool, config: config::Config) -> Self {
        let blobs: Arc<dyn BlobStore> = match &config.model_store_url {
            Some(url) => Arc::new(HttpBlobStore::new(url.clone())),
            None => Arc::new(FsBlobStore::new(config.model_store_dir.clone())),
        };

        let artifacts = Arc::new(ArtifactCache::new(
            blobs,
            config.model_key.clone(),
            config.scaler_key.clone(),
            config.artifact_cache_dir.clone(),
        ));

        let notifier: Arc<dyn Notifier> = match &config.alert_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
            None => Arc::new(LogNotifier),
        };

        Self {
            store: Arc::new(PgMetricStore::new(pool)),
            notifier,
            artifacts,
            config,
        }
    }
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check));

    // Device routes (API-key auth)
    let device_routes = Router::new()
        .route("/api/v1/health-data/status", get(handlers::health::status))
        .route("/api/v1/health-data/ingest", post(handlers::ingest::single))
        .route("/api/v1/health-data/sync", post(handlers::ingest::sync))
        .route("/api/v1/anomaly/score", post(handlers::anomaly::score))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api_key,
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(device_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            // also answers OPTIONS preflights with an empty 200
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
