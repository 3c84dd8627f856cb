//! Serialized outlier-detection models
//!
//! Two artifact families are served behind one capability interface:
//! an isolation-forest ensemble and a dense reconstruction autoencoder.
//! Both expose a raw anomaly score where **higher means more normal**, and
//! an intrinsic decision boundary; a reading is anomalous when its raw score
//! falls below that boundary. Callers never branch on the concrete variant.
//!
//! Artifacts are JSON parameter bundles produced by the offline training
//! pipeline's exporter (flat node arrays for the forest, layer weights for
//! the autoencoder).

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model_type", rename_all = "snake_case")]
pub enum OutlierModel {
    IsolationForest(IsolationForest),
    Autoencoder(Autoencoder),
}

impl OutlierModel {
    /// Native decision boundary of the fitted model. Raw scores strictly
    /// below it are anomalous.
    pub fn decision_threshold(&self) -> f64 {
        match self {
            OutlierModel::IsolationForest(forest) => forest.offset,
            // reconstruction error grows with abnormality, raw score is its
            // negation, so the boundary is the negated error bound
            OutlierModel::Autoencoder(ae) => -ae.error_threshold,
        }
    }

    /// Raw anomaly score for one feature vector, higher = more normal.
    pub fn raw_score(&self, vector: &[f64]) -> AppResult<f64> {
        match self {
            OutlierModel::IsolationForest(forest) => forest.score_samples(vector),
            OutlierModel::Autoencoder(ae) => ae.raw_score(&[vector.to_vec()]),
        }
    }

    /// Raw anomaly score for a sequence of feature vectors.
    ///
    /// The forest scores each row independently and averages; the
    /// autoencoder reconstructs the whole sequence and negates the mean
    /// squared reconstruction error.
    pub fn raw_score_sequence(&self, rows: &[Vec<f64>]) -> AppResult<f64> {
        if rows.is_empty() {
            return Err(AppError::Scoring("empty sequence".to_string()));
        }
        match self {
            OutlierModel::IsolationForest(forest) => {
                let mut total = 0.0;
                for row in rows {
                    total += forest.score_samples(row)?;
                }
                Ok(total / rows.len() as f64)
            }
            OutlierModel::Autoencoder(ae) => ae.raw_score(rows),
        }
    }
}

/// Isolation-forest ensemble, exported as flat per-tree node arrays.
///
/// Scoring follows the fitted model's native semantics: the average path
/// length over all trees, normalized by `c(max_samples)`, squashed to
/// `-(2 ^ (-E[h] / c))`. Isolated points take short paths and score closer
/// to -1; `offset` is the fitted decision boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    /// Training subsample size per tree (path-length normalizer)
    pub max_samples: u32,
    /// Fitted decision boundary; raw scores below it are anomalous
    pub offset: f64,
    pub trees: Vec<IsolationTree>,
}

/// One fitted tree as parallel node arrays. Node 0 is the root; a node with
/// `feature < 0` is a leaf. Internal nodes route `x[feature] <= threshold`
/// to `left`, otherwise to `right`. `n_samples` holds the training sample
/// count that reached each node; leaves get path-length credit for the
/// subtree the fit truncated there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    pub feature: Vec<i32>,
    pub threshold: Vec<f64>,
    pub left: Vec<i32>,
    pub right: Vec<i32>,
    pub n_samples: Vec<u32>,
}

impl IsolationForest {
    /// Raw score for one vector, higher = more normal, range (-1, 0).
    pub fn score_samples(&self, vector: &[f64]) -> AppResult<f64> {
        if self.trees.is_empty() {
            return Err(AppError::Scoring("isolation forest has no trees".to_string()));
        }
        let normalizer = average_path_length(self.max_samples as f64);
        if normalizer <= 0.0 {
            return Err(AppError::Scoring(format!(
                "degenerate max_samples: {}",
                self.max_samples
            )));
        }

        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.path_length(vector)?;
        }
        let mean_depth = total / self.trees.len() as f64;

        Ok(-(2f64.powf(-mean_depth / normalizer)))
    }
}

impl IsolationTree {
    fn path_length(&self, vector: &[f64]) -> AppResult<f64> {
        let mut node = 0usize;
        let mut depth = 0.0;

        loop {
            let feature = *self
                .feature
                .get(node)
                .ok_or_else(|| malformed("feature", node))?;

            if feature < 0 {
                let leaf_samples = *self
                    .n_samples
                    .get(node)
                    .ok_or_else(|| malformed("n_samples", node))?;
                return Ok(depth + average_path_length(leaf_samples as f64));
            }

            let value = *vector.get(feature as usize).ok_or_else(|| {
                AppError::Scoring(format!(
                    "tree splits on feature {} but vector has {} dims",
                    feature,
                    vector.len()
                ))
            })?;
            let split = *self
                .threshold
                .get(node)
                .ok_or_else(|| malformed("threshold", node))?;

            let next = if value <= split {
                *self.left.get(node).ok_or_else(|| malformed("left", node))?
            } else {
                *self.right.get(node).ok_or_else(|| malformed("right", node))?
            };

            if next < 0 || next as usize >= self.feature.len() {
                return Err(malformed("child index", node));
            }

            node = next as usize;
            depth += 1.0;
        }
    }
}

fn malformed(what: &str, node: usize) -> AppError {
    AppError::Scoring(format!("malformed tree artifact: {} at node {}", what, node))
}

/// Expected path length of an unsuccessful BST search over `n` samples.
fn average_path_length(n: f64) -> f64 {
    if n <= 1.0 {
        0.0
    } else if n == 2.0 {
        1.0
    } else {
        2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
    }
}

/// Dense reconstruction autoencoder, exported as layer weight matrices.
///
/// A vector (or each row of a sequence) is passed through the layers and the
/// mean squared difference between input and reconstruction is the anomaly
/// signal. The raw score is the **negated** error so the shared
/// higher-is-more-normal convention holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Autoencoder {
    pub layers: Vec<DenseLayer>,
    /// Reconstruction-error bound calibrated during training
    pub error_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Row-major weights, one row per output unit
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub activation: Activation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
    Linear,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
        }
    }
}

impl Autoencoder {
    /// Negated mean squared reconstruction error over all rows.
    pub fn raw_score(&self, rows: &[Vec<f64>]) -> AppResult<f64> {
        if rows.is_empty() {
            return Err(AppError::Scoring("empty sequence".to_string()));
        }

        let mut total_sq = 0.0;
        let mut count = 0usize;

        for row in rows {
            let input = Array1::from_vec(row.clone());
            let reconstructed = self.reconstruct(&input)?;
            if reconstructed.len() != input.len() {
                return Err(AppError::Scoring(format!(
                    "autoencoder reconstructs {} dims from {}",
                    reconstructed.len(),
                    input.len()
                )));
            }
            for (x, r) in input.iter().zip(reconstructed.iter()) {
                total_sq += (x - r).powi(2);
                count += 1;
            }
        }

        Ok(-(total_sq / count as f64))
    }

    fn reconstruct(&self, input: &Array1<f64>) -> AppResult<Array1<f64>> {
        if self.layers.is_empty() {
            return Err(AppError::Scoring("autoencoder has no layers".to_string()));
        }

        let mut hidden = input.clone();
        for layer in &self.layers {
            hidden = layer.apply(&hidden)?;
        }
        Ok(hidden)
    }
}

impl DenseLayer {
    fn apply(&self, input: &Array1<f64>) -> AppResult<Array1<f64>> {
        let out_dim = self.weights.len();
        let in_dim = input.len();

        let mut flat = Vec::with_capacity(out_dim * in_dim);
        for row in &self.weights {
            if row.len() != in_dim {
                return Err(AppError::Scoring(format!(
                    "layer expects {} inputs, got {}",
                    row.len(),
                    in_dim
                )));
            }
            flat.extend_from_slice(row);
        }
        if self.bias.len() != out_dim {
            return Err(AppError::Scoring(format!(
                "layer has {} bias terms for {} outputs",
                self.bias.len(),
                out_dim
            )));
        }

        let weights = Array2::from_shape_vec((out_dim, in_dim), flat)
            .map_err(|e| AppError::Scoring(format!("layer shape: {}", e)))?;
        let bias = Array1::from_vec(self.bias.clone());

        let z = weights.dot(input) + &bias;
        Ok(z.mapv(|v| self.activation.apply(v)))
    }
}
