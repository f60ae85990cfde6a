//! Preprocessing configuration

use serde::{Deserialize, Serialize};

/// Limits and enhancement parameters for the preprocessing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Square output size fed to the model
    pub target_size: u32,
    /// Smallest accepted width/height (pixels)
    pub min_dimension: u32,
    /// Largest accepted width/height (pixels)
    pub max_dimension: u32,
    /// Largest accepted upload (bytes)
    pub max_file_bytes: usize,
    /// Apply CLAHE + blur after resizing
    pub enhance: bool,
    /// CLAHE clip limit (multiple of the uniform bin height)
    pub clahe_clip_limit: f32,
    /// CLAHE tiles per axis
    pub clahe_tile_grid: u32,
    /// Gaussian blur sigma for denoising
    pub blur_sigma: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_size: 128,
            min_dimension: 50,
            max_dimension: 5000,
            max_file_bytes: 10 * 1024 * 1024,
            enhance: true,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            // Equivalent of a 3x3 kernel with automatic sigma
            blur_sigma: 0.8,
        }
    }
}

impl PreprocessConfig {
    /// Config with enhancement disabled
    pub fn without_enhancement() -> Self {
        Self {
            enhance: false,
            ..Default::default()
        }
    }
}
