//! Preprocessing pipeline

use crate::config::PreprocessConfig;
use crate::enhance::enhance;
use crate::error::PreprocessError;
use crate::metadata::extract_metadata;
use crate::tensor::NormalizedTensor;
use crate::validator::{ValidationResult, Validator};
use domain_types::ImageMetadata;
use image::imageops::{self, FilterType};
use tracing::{debug, warn};

/// Output of a successful preprocessing run
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    /// Model input
    pub tensor: NormalizedTensor,
    /// Dimensions before resizing
    pub original_width: u32,
    pub original_height: u32,
    /// Whether CLAHE + blur were applied
    pub enhanced: bool,
}

/// Stateless image preprocessor, safe to share across threads
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
    validator: Validator,
}

impl ImagePreprocessor {
    /// Create a new preprocessor
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            validator: Validator::new(config.clone()),
            config,
        }
    }

    /// Validate, decode, resize, enhance and normalize an upload.
    ///
    /// Enhancement degrades instead of failing: if CLAHE or the blur cannot be
    /// applied, the plain resized image is used.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<PreprocessedImage, PreprocessError> {
        let probe = self.validator.check(bytes)?;

        let decoded = image::load_from_memory_with_format(bytes, probe.format)
            .map_err(|e| PreprocessError::Decode(e.to_string()))?;

        // Grayscale is expanded, alpha is dropped (not composited)
        let rgb = decoded.to_rgb8();
        let size = self.config.target_size;
        let resized = imageops::resize(&rgb, size, size, FilterType::Lanczos3);

        let (image, enhanced) = if self.config.enhance {
            match enhance(&resized, &self.config) {
                Ok(enhanced) => (enhanced, true),
                Err(e) => {
                    warn!("Enhancement skipped, using resized image: {}", e);
                    (resized, false)
                }
            }
        } else {
            (resized, false)
        };

        debug!(
            "Preprocessed {} {}x{} -> {}x{} (enhanced={})",
            probe.format_name(),
            probe.width,
            probe.height,
            size,
            size,
            enhanced
        );

        Ok(PreprocessedImage {
            tensor: NormalizedTensor::from_rgb(&image),
            original_width: probe.width,
            original_height: probe.height,
            enhanced,
        })
    }

    /// Pre-check an upload without decoding pixels
    pub fn validate(&self, bytes: &[u8]) -> ValidationResult {
        self.validator.validate(bytes)
    }

    /// Descriptive metadata of an upload
    pub fn extract_metadata(&self, bytes: &[u8]) -> Result<ImageMetadata, PreprocessError> {
        extract_metadata(bytes)
    }

    /// Active configuration
    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}
