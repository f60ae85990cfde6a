//! Cell Classification Inference
//!
//! Wraps the external classifier behind a small adapter:
//! - `Classifier` trait with a tract-onnx implementation and a mock
//! - Label policy turning a raw score into a label and confidence
//! - Atomically swappable model artifact with a generation counter
//! - Fire-and-forget retraining trigger

mod artifact;
mod classifier;
mod engine;
mod policy;
mod retrain;

pub use artifact::{ArtifactSource, ModelMetadata};
pub use classifier::{Classifier, MockClassifier, TractClassifier};
pub use engine::{Classification, InferenceEngine, ModelStatus};
pub use policy::{LabelPolarity, ScoredLabel};
pub use retrain::{RetrainConfig, RetrainOutcome, RetrainTrigger};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InferenceError {
    #[error("Model not loaded")]
    ModelUnavailable,
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
}

/// Errors while (re)loading a model artifact. The active artifact is kept.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("No model artifact configured")]
    NotConfigured,
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Invalid model metadata: {0}")]
    Metadata(String),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
