//! Model serving - artifact cache, feature pipeline, outlier scoring

pub mod artifact;
pub mod features;
pub mod model;
pub mod scaler;
pub mod scorer;

pub use artifact::{ArtifactCache, ModelArtifact};
pub use model::OutlierModel;
pub use scaler::StandardScaler;
pub use scorer::{MetricSample, ScoreResult};
