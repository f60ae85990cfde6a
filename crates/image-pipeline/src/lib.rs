//! Image Preprocessing Pipeline
//!
//! Turns untrusted upload bytes into the fixed-size tensor the classifier
//! expects:
//! - Header-only validation (format, dimensions, byte size)
//! - RGB conversion and Lanczos resize
//! - CLAHE on luminance plus a light Gaussian blur (best-effort)
//! - Scaling into [0, 1], channel-last layout
//!
//! Also extracts descriptive metadata, including EXIF capture tags.

mod config;
mod enhance;
mod error;
mod metadata;
mod preprocessor;
mod tensor;
mod validator;

pub use config::PreprocessConfig;
pub use enhance::{clahe, enhance, equalize_luminance};
pub use error::PreprocessError;
pub use metadata::extract_metadata;
pub use preprocessor::{ImagePreprocessor, PreprocessedImage};
pub use tensor::NormalizedTensor;
pub use validator::{ImageProbe, ValidationResult, Validator};
