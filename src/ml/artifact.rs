//! Model artifact cache
//!
//! Loads the serialized outlier model and its fitted scaler from blob
//! storage once per process and keeps them resident. First-callers racing
//! on a cold start are serialized by the cell, so at most one fetch
//! sequence runs; every later call returns the shared artifact with no I/O.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::{AppError, AppResult};
use crate::ml::model::OutlierModel;
use crate::ml::scaler::StandardScaler;
use crate::storage::BlobStore;

/// Fitted model, scaler and derived decision threshold. Immutable once
/// loaded; shared read-only across all scoring calls.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub model: OutlierModel,
    pub scaler: StandardScaler,
    /// Decision boundary derived from the model at load time; raw scores
    /// below it are anomalous
    pub threshold: f64,
}

impl ModelArtifact {
    pub fn new(model: OutlierModel, scaler: StandardScaler) -> Self {
        let threshold = model.decision_threshold();
        Self {
            model,
            scaler,
            threshold,
        }
    }
}

pub struct ArtifactCache {
    blobs: Arc<dyn BlobStore>,
    model_key: String,
    scaler_key: String,
    cache_dir: PathBuf,
    cell: OnceCell<Arc<ModelArtifact>>,
}

impl ArtifactCache {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        model_key: impl Into<String>,
        scaler_key: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            blobs,
            model_key: model_key.into(),
            scaler_key: scaler_key.into(),
            cache_dir: cache_dir.into(),
            cell: OnceCell::new(),
        }
    }

    /// The cached artifact, loading it on the first call.
    pub async fn get_artifact(&self) -> AppResult<Arc<ModelArtifact>> {
        self.cell
            .get_or_try_init(|| self.load())
            .await
            .map(Arc::clone)
    }

    async fn load(&self) -> AppResult<Arc<ModelArtifact>> {
        let model_bytes = self.fetch_through_cache(&self.model_key).await?;
        let scaler_bytes = self.fetch_through_cache(&self.scaler_key).await?;

        let model: OutlierModel = serde_json::from_slice(&model_bytes)
            .map_err(|e| AppError::ArtifactLoad(format!("parse {}: {}", self.model_key, e)))?;
        let scaler: StandardScaler = serde_json::from_slice(&scaler_bytes)
            .map_err(|e| AppError::ArtifactLoad(format!("parse {}: {}", self.scaler_key, e)))?;

        let artifact = ModelArtifact::new(model, scaler);
        tracing::info!(
            model_key = %self.model_key,
            threshold = artifact.threshold,
            "Model artifact loaded"
        );

        Ok(Arc::new(artifact))
    }

    /// Fetch a blob, going through the local ephemeral cache: a blob already
    /// on disk is read back without hitting the store; a fetched blob is
    /// written there for the next cold start of this instance.
    async fn fetch_through_cache(&self, key: &str) -> AppResult<Vec<u8>> {
        let local = self.cache_dir.join(key.replace('/', "_"));

        if let Ok(bytes) = tokio::fs::read(&local).await {
            tracing::debug!(key, path = %local.display(), "Artifact blob read from local cache");
            return Ok(bytes);
        }

        let bytes = self.blobs.fetch(key).await?;

        if let Err(e) = self.write_local(&local, &bytes).await {
            // the fetched bytes are still usable
            tracing::warn!(key, "Failed to cache artifact blob locally: {}", e);
        }

        Ok(bytes)
    }

    async fn write_local(&self, path: &PathBuf, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::write(path, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ml::model::{IsolationForest, IsolationTree};
    use crate::storage::testing::MemoryBlobStore;

    fn model_json() -> Vec<u8> {
        let model = OutlierModel::IsolationForest(IsolationForest {
            max_samples: 8,
            offset: -0.55,
            trees: vec![IsolationTree {
                feature: vec![0, -1, -1],
                threshold: vec![0.0, 0.0, 0.0],
                left: vec![1, -1, -1],
                right: vec![2, -1, -1],
                n_samples: vec![8, 4, 4],
            }],
        });
        serde_json::to_vec(&model).unwrap()
    }

    fn scaler_json() -> Vec<u8> {
        serde_json::to_vec(&StandardScaler::identity(1)).unwrap()
    }

    fn cache_with_store(dir: &std::path::Path) -> (ArtifactCache, Arc<MemoryBlobStore>) {
        let mut blobs = HashMap::new();
        blobs.insert("model.json".to_string(), model_json());
        blobs.insert("scaler.json".to_string(), scaler_json());
        let store = Arc::new(MemoryBlobStore::new(blobs));

        let cache = ArtifactCache::new(
            store.clone() as Arc<dyn BlobStore>,
            "model.json",
            "scaler.json",
            dir,
        );
        (cache, store)
    }

    #[tokio::test]
    async fn repeated_calls_fetch_each_blob_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, store) = cache_with_store(dir.path());

        let first = cache.get_artifact().await.unwrap();
        let second = cache.get_artifact().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.fetch_count(), 2, "one fetch per artifact key");
    }

    #[tokio::test]
    async fn threshold_is_derived_from_model_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache_with_store(dir.path());

        let artifact = cache.get_artifact().await.unwrap();
        assert_eq!(artifact.threshold, -0.55);
    }

    #[tokio::test]
    async fn local_cache_short_circuits_the_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.json"), model_json()).unwrap();
        std::fs::write(dir.path().join("scaler.json"), scaler_json()).unwrap();

        let (cache, store) = cache_with_store(dir.path());
        cache.get_artifact().await.unwrap();

        assert_eq!(store.fetch_count(), 0, "blobs already on local disk");
    }

    #[tokio::test]
    async fn missing_blob_is_artifact_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryBlobStore::new(HashMap::new()));
        let cache = ArtifactCache::new(
            store as Arc<dyn BlobStore>,
            "model.json",
            "scaler.json",
            dir.path(),
        );

        let err = cache.get_artifact().await.unwrap_err();
        assert!(matches!(err, AppError::ArtifactLoad(_)));
    }

    #[tokio::test]
    async fn corrupt_blob_is_artifact_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut blobs = HashMap::new();
        blobs.insert("model.json".to_string(), b"not json".to_vec());
        blobs.insert("scaler.json".to_string(), scaler_json());
        let store = Arc::new(MemoryBlobStore::new(blobs));
        let cache = ArtifactCache::new(
            store as Arc<dyn BlobStore>,
            "model.json",
            "scaler.json",
            dir.path(),
        );

        let err = cache.get_artifact().await.unwrap_err();
        assert!(matches!(err, AppError::ArtifactLoad(_)));
    }
}
