//! Fitted feature scaler
//!
//! Standard (z-score) transform exported by the training pipeline together
//! with the model. The fit happens offline; serving only applies it.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Per-feature mean from the training fit
    pub mean: Vec<f64>,
    /// Per-feature standard deviation from the training fit
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Apply the fitted transform: `(x - mean) / scale` per feature.
    pub fn transform(&self, features: &[f64]) -> AppResult<Vec<f64>> {
        if features.len() != self.mean.len() || features.len() != self.scale.len() {
            return Err(AppError::Scoring(format!(
                "feature vector has {} dims, scaler fitted for {}",
                features.len(),
                self.mean.len()
            )));
        }

        Ok(features
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(x, (mean, scale))| {
                // zero-variance features pass through centered
                if *scale == 0.0 {
                    x - mean
                } else {
                    (x - mean) / scale
                }
            })
            .collect())
    }

    /// Identity scaler for the given dimensionality.
    pub fn identity(dims: usize) -> Self {
        Self {
            mean: vec![0.0; dims],
            scale: vec![1.0; dims],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_applies_mean_and_scale() {
        let scaler = StandardScaler {
            mean: vec![70.0, 100.0],
            scale: vec![10.0, 50.0],
        };

        let out = scaler.transform(&[80.0, 50.0]).unwrap();
        assert_eq!(out, vec![1.0, -1.0]);
    }

    #[test]
    fn transform_rejects_dim_mismatch() {
        let scaler = StandardScaler::identity(4);
        let err = scaler.transform(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, AppError::Scoring(_)));
    }

    #[test]
    fn zero_scale_centers_only() {
        let scaler = StandardScaler {
            mean: vec![5.0],
            scale: vec![0.0],
        };
        let out = scaler.transform(&[7.0]).unwrap();
        assert_eq!(out, vec![2.0]);
    }
}
