//! Model artifact description

use crate::ReloadError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where a model artifact is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSource {
    /// ONNX model file
    pub model_path: PathBuf,
    /// JSON metadata written by the training job
    pub metadata_path: PathBuf,
}

impl ArtifactSource {
    pub fn new(model_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            metadata_path: metadata_path.into(),
        }
    }
}

/// Metadata of a trained model, reported verbatim.
///
/// Keys this service does not know about (e.g. `retrained`) are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub created_at: String,
    /// Height, width, channels
    pub input_shape: [usize; 3],
    /// Class names ordered by output index
    pub class_names: [String; 2],
    pub architecture: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_val_accuracy: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ModelMetadata {
    /// Metadata assumed when the training job left no file behind
    pub fn fallback() -> Self {
        Self {
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            input_shape: [128, 128, 3],
            class_names: ["Uninfected".to_string(), "Parasitized".to_string()],
            architecture: "CNN".to_string(),
            version: "1.0".to_string(),
            final_val_accuracy: None,
            extra: BTreeMap::new(),
        }
    }

    /// Read the metadata file; a missing file yields `fallback()`
    pub fn load(path: &Path) -> Result<Self, ReloadError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Model metadata {} not found, using defaults", path.display());
                return Ok(Self::fallback());
            }
            Err(source) => {
                return Err(ReloadError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let metadata = Self::parse(&raw)?;
        info!(
            "Loaded model metadata: version {} ({})",
            metadata.version, metadata.architecture
        );
        Ok(metadata)
    }

    /// Parse and sanity-check metadata JSON
    pub fn parse(raw: &str) -> Result<Self, ReloadError> {
        let metadata: Self =
            serde_json::from_str(raw).map_err(|e| ReloadError::Metadata(e.to_string()))?;

        if metadata.input_shape.iter().any(|&d| d == 0) {
            return Err(ReloadError::Metadata(format!(
                "input_shape {:?} has a zero dimension",
                metadata.input_shape
            )));
        }
        if metadata.input_shape[2] != 3 {
            return Err(ReloadError::Metadata(format!(
                "expected 3 input channels, got {}",
                metadata.input_shape[2]
            )));
        }
        Ok(metadata)
    }

    /// Expected tensor shape, batch dimension included
    pub fn tensor_shape(&self) -> [usize; 4] {
        let [h, w, c] = self.input_shape;
        [1, h, w, c]
    }
}
