//! Illumination normalization and denoising
//!
//! CLAHE (contrast limited adaptive histogram equalization) is applied to the
//! luminance channel only, so stain colors are preserved while differences in
//! microscope lighting are flattened out.

use crate::config::PreprocessConfig;
use crate::error::PreprocessError;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;

const BINS: usize = 256;

/// Apply CLAHE on luminance followed by a light Gaussian blur
pub fn enhance(image: &RgbImage, config: &PreprocessConfig) -> Result<RgbImage, PreprocessError> {
    if !(config.blur_sigma > 0.0) {
        return Err(PreprocessError::Enhancement(format!(
            "blur sigma must be positive, got {}",
            config.blur_sigma
        )));
    }

    let equalized = equalize_luminance(image, config.clahe_clip_limit, config.clahe_tile_grid)?;
    Ok(gaussian_blur_f32(&equalized, config.blur_sigma))
}

/// Equalize the Y channel of full-range YCbCr and rebuild RGB
pub fn equalize_luminance(
    image: &RgbImage,
    clip_limit: f32,
    tiles: u32,
) -> Result<RgbImage, PreprocessError> {
    let (width, height) = image.dimensions();
    let mut luma = GrayImage::new(width, height);
    let mut chroma = Vec::with_capacity((width * height) as usize);

    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0.map(f32::from);
        let y_val = 0.299 * r + 0.587 * g + 0.114 * b;
        let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        luma.put_pixel(x, y, Luma([clamp_u8(y_val)]));
        chroma.push((cb - 128.0, cr - 128.0));
    }

    let equalized = clahe(&luma, clip_limit, tiles)?;

    let mut out = RgbImage::new(width, height);
    for ((x, y, pixel), (cb, cr)) in equalized.enumerate_pixels().zip(chroma) {
        let y_val = f32::from(pixel[0]);
        out.put_pixel(
            x,
            y,
            Rgb([
                clamp_u8(y_val + 1.402 * cr),
                clamp_u8(y_val - 0.344_136 * cb - 0.714_136 * cr),
                clamp_u8(y_val + 1.772 * cb),
            ]),
        );
    }
    Ok(out)
}

/// Contrast limited adaptive histogram equalization on a grayscale image
pub fn clahe(image: &GrayImage, clip_limit: f32, tiles: u32) -> Result<GrayImage, PreprocessError> {
    let (width, height) = image.dimensions();
    if tiles == 0 || width < tiles || height < tiles {
        return Err(PreprocessError::Enhancement(format!(
            "{}x{} tile grid does not fit a {}x{} image",
            tiles, tiles, width, height
        )));
    }
    if !(clip_limit > 0.0) {
        return Err(PreprocessError::Enhancement(format!(
            "clip limit must be positive, got {}",
            clip_limit
        )));
    }

    let grid = tiles as usize;
    let tile_w = width / tiles;
    let tile_h = height / tiles;

    // Per-tile lookup tables, row-major over the grid
    let mut luts = Vec::with_capacity(grid * grid);
    for ty in 0..tiles {
        for tx in 0..tiles {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            // Last row/column of tiles absorbs the remainder
            let x1 = if tx == tiles - 1 { width } else { x0 + tile_w };
            let y1 = if ty == tiles - 1 { height } else { y0 + tile_h };

            let mut hist = [0u32; BINS];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            luts.push(tile_lut(hist, area, clip_limit));
        }
    }

    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let (tx0, tx1, ax) = neighbours(x, tile_w, grid);
        let (ty0, ty1, ay) = neighbours(y, tile_h, grid);
        let v = pixel[0] as usize;

        let top = (1.0 - ax) * luts[ty0 * grid + tx0][v] + ax * luts[ty0 * grid + tx1][v];
        let bottom = (1.0 - ax) * luts[ty1 * grid + tx0][v] + ax * luts[ty1 * grid + tx1][v];
        out.put_pixel(x, y, Luma([clamp_u8((1.0 - ay) * top + ay * bottom)]));
    }
    Ok(out)
}

/// Clip the histogram, spread the excess evenly and build the CDF mapping
fn tile_lut(mut hist: [u32; BINS], area: u32, clip_limit: f32) -> [f32; BINS] {
    let clip = ((clip_limit * area as f32 / BINS as f32) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    let share = excess / BINS as u32;
    let remainder = (excess % BINS as u32) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0.0f32; BINS];
    let mut cdf = 0u32;
    for (i, count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = cdf as f32 * scale;
    }
    lut
}

/// Tile indices on either side of a pixel centre and the interpolation weight
fn neighbours(pos: u32, tile_size: u32, grid: usize) -> (usize, usize, f32) {
    let g = (pos as f32 + 0.5) / tile_size as f32 - 0.5;
    let t0 = (g.floor().max(0.0) as usize).min(grid - 1);
    let t1 = (t0 + 1).min(grid - 1);
    let weight = (g - t0 as f32).clamp(0.0, 1.0);
    (t0, t1, weight)
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
