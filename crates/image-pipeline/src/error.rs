//! Preprocessing Error Types

use thiserror::Error;

/// Errors during image validation and preprocessing
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PreprocessError {
    /// Bytes are not a decodable image
    #[error("Invalid image file: {0}")]
    Decode(String),

    /// Decodable, but not one of the accepted formats
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// A dimension is below the minimum
    #[error("Image too small ({width}x{height}, minimum {min}x{min} pixels)")]
    TooSmall { width: u32, height: u32, min: u32 },

    /// A dimension is above the maximum
    #[error("Image too large ({width}x{height}, maximum {max}x{max} pixels)")]
    TooLarge { width: u32, height: u32, max: u32 },

    /// Upload exceeds the byte limit
    #[error("Image file too large ({size} bytes, maximum {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    /// CLAHE or blur could not be applied
    #[error("Image enhancement failed: {0}")]
    Enhancement(String),
}

impl PreprocessError {
    /// Whether the error is the client's fault (bad upload)
    pub fn is_invalid_image(&self) -> bool {
        !matches!(self, PreprocessError::Enhancement(_))
    }
}
