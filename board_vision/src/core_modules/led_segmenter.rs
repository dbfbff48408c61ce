// THEORY:
// The `LedSegmenter` marks the pixels that belong to a lit LED. A single colour
// rule is not robust on real boards: yellow LEDs saturate to white in the centre,
// and white LEDs carry almost no hue. The segmenter therefore combines three
// independent votes and then cleans up the result:
//
// 1.  **Colour Votes**: In 8-bit HSV, one range captures yellow-ish lit colours and
//     one captures near-white, low-saturation bright pixels.
// 2.  **Colour Cleanup**: Opening (erode + dilate) removes speckle, closing
//     (dilate + erode) bridges small gaps, both with a square element.
// 3.  **Brightness Vote**: Gray levels above a fixed cut capture saturated
//     highlights the colour ranges miss.
// 4.  **Final Cleanup**: The union is opened and closed again with the same element.
//
// An all-black mask is a valid answer (nothing lit) and is returned as such.

use crate::config::SegmenterConfig;
use crate::core_modules::image_helper::{MASK_OFF, MASK_ON, binarize, count_nonzero, to_gray, union};
use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{InspectionError, InspectionOutcome};
use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::map::map_colors;
use imageproc::morphology::{close, open};
use tracing::debug;

/// A binary image (values 0 or 255) with the dimensions of its source image.
pub type Mask = GrayImage;

/// Produces lit-pixel masks from normalized colour images.
#[derive(Debug, Clone)]
pub struct LedSegmenter {
    config: SegmenterConfig,
}

impl LedSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn segment(&self, image: &RgbImage) -> InspectionOutcome<Mask> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(InspectionError::segmentation(format!(
                "cannot segment a {width}x{height} image"
            )));
        }

        // --- 1. Colour Votes ---
        let colour_mask = self.colour_mask(image);

        // --- 2. Colour Cleanup ---
        let colour_mask = self.clean(&colour_mask);

        // --- 3. Brightness Vote ---
        let bright_mask = binarize(&to_gray(image), self.config.brightness_threshold);

        // --- 4. Final Cleanup ---
        let mask = self.clean(&union(&colour_mask, &bright_mask));

        if mask.dimensions() != image.dimensions() {
            return Err(InspectionError::segmentation(format!(
                "mask is {:?} but source is {:?}",
                mask.dimensions(),
                image.dimensions()
            )));
        }

        let lit = count_nonzero(&mask);
        if lit == 0 {
            debug!(width, height, "no lit pixels detected");
        } else {
            debug!(width, height, lit, "lit pixels segmented");
        }
        Ok(mask)
    }

    /// Union of the yellow and white HSV ranges, before any cleanup.
    pub fn colour_mask(&self, image: &RgbImage) -> Mask {
        let yellow = self.config.yellow;
        let white = self.config.white;
        map_colors(image, |rgb| {
            let hsv = Pixel::from(&rgb).hsv_bytes();
            let lit = yellow.contains(hsv) || white.contains(hsv);
            Luma([if lit { MASK_ON } else { MASK_OFF }])
        })
    }

    /// Opening then closing with a (2r+1)x(2r+1) square.
    fn clean(&self, mask: &Mask) -> Mask {
        let radius = self.config.kernel_radius;
        if radius == 0 {
            return mask.clone();
        }
        close(&open(mask, Norm::LInf, radius), Norm::LInf, radius)
    }
}

impl Default for LedSegmenter {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn paint(image: &mut RgbImage, x0: u32, y0: u32, size: u32, color: Rgb<u8>) {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                image.put_pixel(x, y, color);
            }
        }
    }

    #[test]
    fn yellow_led_is_marked() {
        let mut image = RgbImage::from_pixel(40, 40, Rgb([20, 30, 20]));
        paint(&mut image, 10, 10, 8, Rgb([250, 200, 40]));
        let mask = LedSegmenter::default().segment(&image).unwrap();
        assert_eq!(mask.dimensions(), (40, 40));
        assert_eq!(mask.get_pixel(13, 13)[0], MASK_ON);
        assert_eq!(mask.get_pixel(30, 30)[0], MASK_OFF);
    }

    #[test]
    fn white_highlight_is_marked() {
        let mut image = RgbImage::new(40, 40);
        paint(&mut image, 20, 5, 10, Rgb([240, 240, 235]));
        let mask = LedSegmenter::default().segment(&image).unwrap();
        assert_eq!(mask.get_pixel(25, 10)[0], MASK_ON);
    }

    #[test]
    fn isolated_speckle_is_removed() {
        let mut image = RgbImage::new(30, 30);
        image.put_pixel(15, 15, Rgb([255, 255, 255]));
        image.put_pixel(16, 15, Rgb([255, 255, 255]));
        let mask = LedSegmenter::default().segment(&image).unwrap();
        assert!(mask.as_raw().iter().all(|&v| v == MASK_OFF));
    }

    #[test]
    fn dark_board_yields_valid_empty_mask() {
        let image = RgbImage::from_pixel(16, 12, Rgb([10, 40, 10]));
        let mask = LedSegmenter::default().segment(&image).unwrap();
        assert_eq!(mask.dimensions(), (16, 12));
        assert!(mask.as_raw().iter().all(|&v| v == MASK_OFF));
    }

    #[test]
    fn mask_values_are_binary() {
        let mut image = RgbImage::from_pixel(32, 32, Rgb([60, 60, 60]));
        paint(&mut image, 4, 4, 12, Rgb([255, 220, 90]));
        paint(&mut image, 18, 18, 9, Rgb([210, 210, 210]));
        let mask = LedSegmenter::default().segment(&image).unwrap();
        assert!(mask.as_raw().iter().all(|&v| v == MASK_ON || v == MASK_OFF));
    }

    #[test]
    fn zero_area_is_a_segmentation_failure() {
        let result = LedSegmenter::default().segment(&RgbImage::new(0, 0));
        assert!(matches!(result, Err(InspectionError::Segmentation(_))));
    }
}
