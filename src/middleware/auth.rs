//! API-key middleware
//!
//! Device clients authenticate with an `X-API-Key` header. The configured
//! credential is a SHA-256 digest so the key itself never sits in config;
//! with no digest configured (development), any non-empty key is accepted.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::{AppError, AppState};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Middleware: require a valid device API key
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !validate_api_key(key, state.config.api_key_digest.as_deref()) {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(req).await)
}

fn validate_api_key(key: &str, expected_digest: Option<&str>) -> bool {
    if key.is_empty() {
        return false;
    }

    match expected_digest {
        Some(digest) => hash_key(key).eq_ignore_ascii_case(digest),
        // development mode: any non-empty key
        None => true,
    }
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}
