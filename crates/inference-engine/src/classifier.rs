//! Classifier backends

use crate::{InferenceError, ReloadError};
use image_pipeline::NormalizedTensor;
use std::path::Path;
use tracing::{debug, info};
use tract_onnx::prelude::*;

/// The external model: one image in, one raw score out
pub trait Classifier: Send + Sync {
    /// Raw score for the infected class, nominally in [0, 1]
    fn predict(&self, input: &NormalizedTensor) -> Result<f32, InferenceError>;

    /// Number of trainable parameters, when known
    fn parameter_count(&self) -> u64 {
        0
    }

    /// Whether `predict` may run concurrently on the same instance
    fn is_reentrant(&self) -> bool;
}

/// Classifier backed by an ONNX model executed with tract
pub struct TractClassifier {
    plan: TypedRunnableModel<TypedModel>,
    input_shape: [usize; 4],
    parameters: u64,
}

impl TractClassifier {
    /// Load and optimize an ONNX model taking a (1, height, width, 3) f32 input
    pub fn load(path: &Path, height: usize, width: usize) -> Result<Self, ReloadError> {
        info!("Loading ONNX model from {}", path.display());
        let load_err = |e: TractError| ReloadError::ModelLoad(format!("{}: {:#}", path.display(), e));

        let onnx = tract_onnx::onnx();
        let proto = onnx.proto_model_for_path(path).map_err(load_err)?;

        // Initializers hold the trained weights
        let parameters = proto
            .graph
            .as_ref()
            .map(|g| {
                g.initializer
                    .iter()
                    .map(|t| t.dims.iter().map(|&d| d.max(0) as u64).product::<u64>())
                    .sum()
            })
            .unwrap_or(0);

        let plan = onnx
            .model_for_proto_model(&proto)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, height, width, 3)),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(load_err)?;

        info!("ONNX model ready ({} parameters)", parameters);
        Ok(Self {
            plan,
            input_shape: [1, height, width, 3],
            parameters,
        })
    }
}

impl Classifier for TractClassifier {
    fn predict(&self, input: &NormalizedTensor) -> Result<f32, InferenceError> {
        if input.shape() != self.input_shape {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{:?}", self.input_shape),
                actual: format!("{:?}", input.shape()),
            });
        }

        let tensor = Tensor::from_shape(&self.input_shape, &input.to_vec())
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::InferenceFailed(format!("{:#}", e)))?;

        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::InferenceFailed("model produced no output".to_string()))?;
        let values = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        // Sigmoid head gives one value, softmax head gives one per class
        let score = match values.len() {
            1 => values.iter().next().copied(),
            2 => values.iter().nth(1).copied(),
            n => {
                return Err(InferenceError::InferenceFailed(format!(
                    "expected 1 or 2 output values, got {}",
                    n
                )))
            }
        };
        score.ok_or_else(|| InferenceError::InferenceFailed("empty output".to_string()))
    }

    fn parameter_count(&self) -> u64 {
        self.parameters
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}

/// Deterministic stand-in used when no model file is available
#[derive(Debug, Clone, Default)]
pub struct MockClassifier {
    fixed_score: Option<f32>,
    reentrant: bool,
}

impl MockClassifier {
    /// Score is one minus the mean intensity: dark, dense stains score high
    pub fn new() -> Self {
        Self {
            fixed_score: None,
            reentrant: true,
        }
    }

    /// Always return the given score
    pub fn with_score(score: f32) -> Self {
        Self {
            fixed_score: Some(score),
            reentrant: true,
        }
    }

    /// Report the classifier as not safe for concurrent use
    pub fn non_reentrant(mut self) -> Self {
        self.reentrant = false;
        self
    }
}

impl Classifier for MockClassifier {
    fn predict(&self, input: &NormalizedTensor) -> Result<f32, InferenceError> {
        let score = self.fixed_score.unwrap_or_else(|| 1.0 - input.mean());
        debug!("Mock classifier score {:.4}", score);
        Ok(score)
    }

    fn is_reentrant(&self) -> bool {
        self.reentrant
    }
}
