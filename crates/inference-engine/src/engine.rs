//! Inference Engine Implementation

use crate::artifact::{ArtifactSource, ModelMetadata};
use crate::classifier::{Classifier, MockClassifier, TractClassifier};
use crate::policy::LabelPolarity;
use crate::{InferenceError, ReloadError};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use domain_types::Label;
use image_pipeline::NormalizedTensor;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of classifying one image
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: Label,
    /// Confidence in the returned label, in [0.5, 1]
    pub confidence: f64,
    /// Wall-clock time of the model call, in seconds
    pub latency_secs: f64,
    /// Version of the artifact that produced the result
    pub model_version: String,
}

/// Snapshot of the active artifact
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ModelMetadata>,
    pub parameter_count: u64,
    /// Bumped by every successful swap, 0 before the first load
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
    pub backend: &'static str,
    pub label_polarity: LabelPolarity,
}

/// A loaded artifact. Replaced as a whole, never mutated.
struct LoadedModel {
    classifier: Box<dyn Classifier>,
    metadata: ModelMetadata,
    backend: &'static str,
    loaded_at: DateTime<Utc>,
    generation: u64,
    // Serializes calls into classifiers that are not reentrant
    gate: Mutex<()>,
}

/// How `reload` obtains a fresh artifact
enum Loader {
    None,
    Onnx(ArtifactSource),
    Mock(MockClassifier),
}

/// Shared classifier handle with atomic artifact replacement
pub struct InferenceEngine {
    active: ArcSwapOption<LoadedModel>,
    generation: AtomicU64,
    loader: Loader,
    polarity: LabelPolarity,
    reload_lock: Mutex<()>,
}

impl InferenceEngine {
    fn with_loader(loader: Loader, polarity: LabelPolarity) -> Self {
        Self {
            active: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            loader,
            polarity,
            reload_lock: Mutex::new(()),
        }
    }

    /// Engine backed by an ONNX artifact. Nothing is loaded until `reload`.
    pub fn onnx(source: ArtifactSource, polarity: LabelPolarity) -> Self {
        info!(
            "Creating inference engine with model: {}",
            source.model_path.display()
        );
        Self::with_loader(Loader::Onnx(source), polarity)
    }

    /// Engine with no artifact and no way to load one
    pub fn unloaded() -> Self {
        Self::with_loader(Loader::None, LabelPolarity::Standard)
    }

    /// Create a mock inference engine for testing
    pub fn mock() -> Self {
        Self::mock_with(MockClassifier::new(), LabelPolarity::Standard)
    }

    /// Loaded mock engine; `reload` swaps in a fresh copy of the mock
    pub fn mock_with(classifier: MockClassifier, polarity: LabelPolarity) -> Self {
        info!("Creating mock inference engine");
        let engine = Self::with_loader(Loader::Mock(classifier.clone()), polarity);
        engine.install(Box::new(classifier), ModelMetadata::fallback(), "mock");
        engine
    }

    /// Loaded engine around an arbitrary classifier; `reload` is not supported
    pub fn with_classifier(
        classifier: Box<dyn Classifier>,
        metadata: ModelMetadata,
        polarity: LabelPolarity,
    ) -> Self {
        let engine = Self::with_loader(Loader::None, polarity);
        engine.install(classifier, metadata, "custom");
        engine
    }

    /// Build a new artifact and swap it in. On failure the active artifact stays.
    ///
    /// Blocking: reads files and optimizes the model graph.
    pub fn reload(&self) -> Result<(), ReloadError> {
        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (classifier, metadata, backend) = match &self.loader {
            Loader::None => return Err(ReloadError::NotConfigured),
            Loader::Mock(mock) => (
                Box::new(mock.clone()) as Box<dyn Classifier>,
                ModelMetadata::fallback(),
                "mock",
            ),
            Loader::Onnx(source) => {
                let metadata = ModelMetadata::load(&source.metadata_path)?;
                let [height, width, _] = metadata.input_shape;
                let classifier = TractClassifier::load(&source.model_path, height, width)?;
                (Box::new(classifier) as Box<dyn Classifier>, metadata, "onnx")
            }
        };

        let generation = self.install(classifier, metadata, backend);
        info!("Model artifact swapped in (generation {})", generation);
        Ok(())
    }

    fn install(&self, classifier: Box<dyn Classifier>, metadata: ModelMetadata, backend: &'static str) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.store(Some(Arc::new(LoadedModel {
            classifier,
            metadata,
            backend,
            loaded_at: Utc::now(),
            generation,
            gate: Mutex::new(()),
        })));
        generation
    }

    /// Classify one preprocessed image with the active artifact.
    ///
    /// Blocking: runs the model on the calling thread.
    pub fn classify(&self, input: &NormalizedTensor) -> Result<Classification, InferenceError> {
        // Holding the Arc keeps this artifact alive across a concurrent reload
        let model = self.active.load_full().ok_or(InferenceError::ModelUnavailable)?;

        let expected = model.metadata.tensor_shape();
        if input.shape() != expected {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{:?}", expected),
                actual: format!("{:?}", input.shape()),
            });
        }

        let (raw, latency_secs) = if model.classifier.is_reentrant() {
            timed_predict(model.classifier.as_ref(), input)
        } else {
            let _gate = model.gate.lock().unwrap_or_else(PoisonError::into_inner);
            timed_predict(model.classifier.as_ref(), input)
        };
        let score = raw?;

        if !score.is_finite() {
            warn!("Classifier returned non-finite score {}", score);
            return Err(InferenceError::InferenceFailed(format!(
                "non-finite score {}",
                score
            )));
        }

        let scored = self.polarity.apply(score);
        debug!(
            "Classified as {} ({:.3}) in {:.1}ms, generation {}",
            scored.label,
            scored.confidence,
            latency_secs * 1000.0,
            model.generation
        );

        Ok(Classification {
            label: scored.label,
            confidence: scored.confidence,
            latency_secs,
            model_version: model.metadata.version.clone(),
        })
    }

    /// Describe the active artifact
    pub fn status(&self) -> ModelStatus {
        match self.active.load_full() {
            Some(model) => ModelStatus {
                loaded: true,
                parameter_count: model.classifier.parameter_count(),
                generation: model.generation,
                loaded_at: Some(model.loaded_at),
                backend: model.backend,
                metadata: Some(model.metadata.clone()),
                label_polarity: self.polarity,
            },
            None => ModelStatus {
                loaded: false,
                metadata: None,
                parameter_count: 0,
                generation: 0,
                loaded_at: None,
                backend: "none",
                label_polarity: self.polarity,
            },
        }
    }

    /// Check if an artifact is loaded
    pub fn is_loaded(&self) -> bool {
        self.active.load().is_some()
    }

    /// Generation of the active artifact, 0 when none is loaded
    pub fn generation(&self) -> u64 {
        self.active.load().as_ref().map_or(0, |m| m.generation)
    }

    /// Active label polarity
    pub fn polarity(&self) -> LabelPolarity {
        self.polarity
    }
}

fn timed_predict(
    classifier: &dyn Classifier,
    input: &NormalizedTensor,
) -> (Result<f32, InferenceError>, f64) {
    let start = Instant::now();
    let raw = classifier.predict(input);
    (raw, start.elapsed().as_secs_f64())
}
