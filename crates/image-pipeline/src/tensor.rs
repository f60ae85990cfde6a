//! Model input tensor

use image::RgbImage;
use ndarray::Array4;

/// Image scaled into [0, 1], shaped (1, height, width, 3), channel-last
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Array4<f32>,
}

impl NormalizedTensor {
    /// Build from an RGB image
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let data = Array4::from_shape_fn(
            (1, height as usize, width as usize, 3),
            |(_, y, x, c)| f32::from(image.get_pixel(x as u32, y as u32)[c]) / 255.0,
        );
        Self { data }
    }

    /// Wrap an existing array
    pub fn from_array(data: Array4<f32>) -> Self {
        Self { data }
    }

    /// Shape as (batch, height, width, channels)
    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    /// Underlying array
    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    /// Values in row-major order
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Mean over all values
    pub fn mean(&self) -> f32 {
        self.data.mean().unwrap_or(0.0)
    }

    /// Smallest and largest value
    pub fn value_range(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}
