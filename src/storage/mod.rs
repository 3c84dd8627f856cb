//! Blob storage - opaque get-by-key access to model artifacts

use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Read-only blob store collaborator. Model and scaler artifacts are
/// published under fixed keys by the offline training pipeline.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, key: &str) -> AppResult<Vec<u8>>;
}

/// Local-directory blob store (artifact directory mounted next to the server)
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn fetch(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.root.join(key);
        tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::ArtifactLoad(format!("read {}: {}", path.display(), e)))
    }
}

/// HTTP object store (base URL + key)
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, key: &str) -> AppResult<Vec<u8>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ArtifactLoad(format!("GET {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::ArtifactLoad(format!(
                "GET {}: status {}",
                url,
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| AppError::ArtifactLoad(format!("GET {}: {}", url, e)))
    }
}
