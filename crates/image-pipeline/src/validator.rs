//! Upload validation
//!
//! Checks are done on the container header only, so oversized or bogus
//! uploads are rejected before any pixel data is decoded.

use crate::config::PreprocessConfig;
use crate::error::PreprocessError;
use image::{ColorType, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;

/// Formats accepted for classification
const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// Header information read without decoding pixels
#[derive(Debug, Clone, PartialEq)]
pub struct ImageProbe {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub color_type: ColorType,
    pub byte_len: usize,
}

impl ImageProbe {
    /// Read format, dimensions and color type from the header
    pub fn read(bytes: &[u8]) -> Result<Self, PreprocessError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PreprocessError::Decode(e.to_string()))?;

        let format = reader
            .format()
            .ok_or_else(|| PreprocessError::Decode("unrecognized image data".to_string()))?;

        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(PreprocessError::UnsupportedFormat(format_name(format).to_string()));
        }

        let decoder = reader
            .into_decoder()
            .map_err(|e| PreprocessError::Decode(e.to_string()))?;
        let (width, height) = decoder.dimensions();

        Ok(Self {
            format,
            width,
            height,
            color_type: decoder.color_type(),
            byte_len: bytes.len(),
        })
    }

    /// Lowercase format name
    pub fn format_name(&self) -> &'static str {
        format_name(self.format)
    }
}

/// Result of the pre-check
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Whether the upload passed every check
    pub valid: bool,
    /// Human readable reason
    pub reason: String,
}

impl ValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: "Image is valid".to_string(),
        }
    }

    /// Create an invalid result from the failing check
    pub fn invalid(error: &PreprocessError) -> Self {
        Self {
            valid: false,
            reason: error.to_string(),
        }
    }
}

/// Upload validator
#[derive(Debug, Clone)]
pub struct Validator {
    config: PreprocessConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Run every check, returning the header probe on success
    pub fn check(&self, bytes: &[u8]) -> Result<ImageProbe, PreprocessError> {
        self.validate_file_size(bytes.len())?;
        let probe = ImageProbe::read(bytes)?;
        self.validate_dimensions(probe.width, probe.height)?;
        Ok(probe)
    }

    /// Pre-check usable before committing to full preprocessing
    pub fn validate(&self, bytes: &[u8]) -> ValidationResult {
        match self.check(bytes) {
            Ok(_) => ValidationResult::valid(),
            Err(e) => ValidationResult::invalid(&e),
        }
    }

    /// Validate the upload size
    pub fn validate_file_size(&self, size: usize) -> Result<(), PreprocessError> {
        if size > self.config.max_file_bytes {
            Err(PreprocessError::FileTooLarge {
                size,
                max: self.config.max_file_bytes,
            })
        } else {
            Ok(())
        }
    }

    /// Validate pixel dimensions
    pub fn validate_dimensions(&self, width: u32, height: u32) -> Result<(), PreprocessError> {
        let min = self.config.min_dimension;
        let max = self.config.max_dimension;

        if width < min || height < min {
            return Err(PreprocessError::TooSmall { width, height, min });
        }
        if width > max || height > max {
            return Err(PreprocessError::TooLarge { width, height, max });
        }
        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Ico => "ico",
        _ => "other",
    }
}
