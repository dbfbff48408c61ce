// THEORY:
// The `ImageNormalizer` reduces illumination variance between captures before any
// comparison happens. It works on luminance only, so the LED colours the segmenter
// relies on are preserved.
//
// Algorithm steps:
// 1.  **Decompose**: RGB -> 8-bit L*a*b* (see `pixel`).
// 2.  **Tile Histograms**: The L channel is split into a `tiles_x` x `tiles_y` grid.
//     Tile sizes are ceil(dimension / tiles); samples past the image edge are
//     mirrored (reflect-101) so every tile sees a full histogram.
// 3.  **Clip & Redistribute**: Each histogram bin is limited to
//     max(1, clip_limit * tile_area / 256). The clipped excess is spread evenly
//     across all 256 bins and the remainder with a fixed stride.
// 4.  **Tile LUTs**: The clipped cumulative histogram, scaled by 255 / tile_area,
//     becomes a per-tile lookup table.
// 5.  **Bilinear Blend**: Every pixel interpolates the LUTs of the four nearest tile
//     centres, which removes tile seams.
// 6.  **Recompose**: New L with the original a/b, back to RGB.
//
// Failure policy: normalization never aborts an inspection. Invalid input is
// logged and the image is returned unmodified.

use crate::config::NormalizerConfig;
use crate::core_modules::pixel::pixel::Pixel;
use image::{GrayImage, Luma, RgbImage};
use thiserror::Error;
use tracing::{debug, warn};

const HIST_SIZE: usize = 256;

/// Reasons the normalizer fell back to the unmodified image.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizationFailure {
    #[error("image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("invalid equalization settings: {0}")]
    InvalidSettings(String),
}

/// Local contrast correction on the luminance channel.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
}

impl ImageNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Returns the equalized image, or a copy of `image` when equalization is not possible.
    pub fn normalize(&self, image: &RgbImage) -> RgbImage {
        match self.try_normalize(image) {
            Ok(normalized) => normalized,
            Err(failure) => {
                warn!("normalization skipped, using unmodified image: {failure}");
                image.clone()
            }
        }
    }

    pub fn try_normalize(&self, image: &RgbImage) -> Result<RgbImage, NormalizationFailure> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(NormalizationFailure::EmptyImage { width, height });
        }
        if self.config.tiles_x == 0 || self.config.tiles_y == 0 {
            return Err(NormalizationFailure::InvalidSettings("tile grid must be non-zero".into()));
        }
        if !(self.config.clip_limit > 0.0) {
            return Err(NormalizationFailure::InvalidSettings(format!(
                "clip limit must be positive, got {}",
                self.config.clip_limit
            )));
        }

        // --- 1. Decompose ---
        let mut lab: Vec<[u8; 3]> = Vec::with_capacity((width * height) as usize);
        for rgb in image.pixels() {
            lab.push(Pixel::from(rgb).lab_bytes());
        }
        let lightness = GrayImage::from_fn(width, height, |x, y| Luma([lab[(y * width + x) as usize][0]]));

        // --- 2-5. Equalize L ---
        let equalized = self.equalize(&lightness);
        debug!(width, height, "luminance equalized");

        // --- 6. Recompose ---
        let normalized = RgbImage::from_fn(width, height, |x, y| {
            let [_, a, b] = lab[(y * width + x) as usize];
            Pixel::from_lab_bytes([equalized.get_pixel(x, y)[0], a, b]).into()
        });
        Ok(normalized)
    }

    /// Contrast-limited adaptive histogram equalization of a single channel.
    pub fn equalize(&self, channel: &GrayImage) -> GrayImage {
        let (width, height) = channel.dimensions();
        let tiles_x = self.config.tiles_x as usize;
        let tiles_y = self.config.tiles_y as usize;
        let tile_w = (width as usize).div_ceil(tiles_x);
        let tile_h = (height as usize).div_ceil(tiles_y);
        let tile_area = (tile_w * tile_h) as f64;

        let clip = ((self.config.clip_limit * tile_area / HIST_SIZE as f64) as usize).max(1);
        let lut_scale = (HIST_SIZE - 1) as f64 / tile_area;

        let mut luts = vec![[0u8; HIST_SIZE]; tiles_x * tiles_y];
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let mut hist = [0usize; HIST_SIZE];
                for dy in 0..tile_h {
                    let y = reflect_101(ty * tile_h + dy, height as usize);
                    for dx in 0..tile_w {
                        let x = reflect_101(tx * tile_w + dx, width as usize);
                        hist[channel.get_pixel(x as u32, y as u32)[0] as usize] += 1;
                    }
                }
                clip_histogram(&mut hist, clip);

                let lut = &mut luts[ty * tiles_x + tx];
                let mut cumulative = 0usize;
                for (bin, count) in hist.iter().enumerate() {
                    cumulative += count;
                    lut[bin] = (cumulative as f64 * lut_scale).round().min(255.0) as u8;
                }
            }
        }

        let inv_tile_w = 1.0 / tile_w as f64;
        let inv_tile_h = 1.0 / tile_h as f64;

        GrayImage::from_fn(width, height, |x, y| {
            let value = channel.get_pixel(x, y)[0] as usize;

            let tyf = y as f64 * inv_tile_h - 0.5;
            let ty1 = tyf.floor() as isize;
            let ya = tyf - ty1 as f64;
            let ty2 = ((ty1 + 1).max(0) as usize).min(tiles_y - 1);
            let ty1 = (ty1.max(0) as usize).min(tiles_y - 1);

            let txf = x as f64 * inv_tile_w - 0.5;
            let tx1 = txf.floor() as isize;
            let xa = txf - tx1 as f64;
            let tx2 = ((tx1 + 1).max(0) as usize).min(tiles_x - 1);
            let tx1 = (tx1.max(0) as usize).min(tiles_x - 1);

            let lut = |tx: usize, ty: usize| luts[ty * tiles_x + tx][value] as f64;
            let top = lut(tx1, ty1) * (1.0 - xa) + lut(tx2, ty1) * xa;
            let bottom = lut(tx1, ty2) * (1.0 - xa) + lut(tx2, ty2) * xa;
            Luma([(top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8])
        })
    }
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

/// Limits every bin to `clip` and redistributes the excess.
fn clip_histogram(hist: &mut [usize; HIST_SIZE], clip: usize) {
    let mut clipped = 0;
    for count in hist.iter_mut() {
        if *count > clip {
            clipped += *count - clip;
            *count = clip;
        }
    }

    let batch = clipped / HIST_SIZE;
    let mut residual = clipped - batch * HIST_SIZE;
    for count in hist.iter_mut() {
        *count += batch;
    }

    if residual > 0 {
        let step = (HIST_SIZE / residual).max(1);
        let mut bin = 0;
        while bin < HIST_SIZE && residual > 0 {
            hist[bin] += 1;
            residual -= 1;
            bin += step;
        }
    }
}

/// Mirrors an index past either end of `0..len` without repeating the edge sample.
fn reflect_101(index: usize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let folded = index % period;
    if folded < len { folded } else { period - folded }
}
