// Whole-image helpers shared by the stages: grayscale conversion, binarization,
// mask arithmetic, box drawing and PNG encoding.

use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::region::Region;
use image::{GrayImage, ImageEncoder, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::map::{map_colors, map_colors2};
use imageproc::rect::Rect;

pub const MASK_ON: u8 = 255;
pub const MASK_OFF: u8 = 0;

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

pub fn to_gray(image: &RgbImage) -> GrayImage {
    map_colors(image, |rgb| Luma([Pixel::from(&rgb).gray()]))
}

/// Pixels strictly above `threshold` become `MASK_ON`, all others `MASK_OFF`.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    map_colors(gray, |luma| Luma([if luma[0] > threshold { MASK_ON } else { MASK_OFF }]))
}

/// Pixel-wise union of two same-sized masks.
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    map_colors2(a, b, |p, q| Luma([p[0].max(q[0])]))
}

/// Pixel-wise absolute difference of two same-sized gray images.
pub fn absdiff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    map_colors2(a, b, |p, q| Luma([p[0].abs_diff(q[0])]))
}

pub fn count_nonzero(image: &GrayImage) -> usize {
    image.as_raw().iter().filter(|&&v| v != 0).count()
}

/// Number of positions inside `region` where the two images differ.
pub fn count_differences(a: &GrayImage, b: &GrayImage, region: Region) -> usize {
    let mut differing = 0;
    for y in region.y..region.y + region.height {
        for x in region.x..region.x + region.width {
            if a.get_pixel(x, y)[0] != b.get_pixel(x, y)[0] {
                differing += 1;
            }
        }
    }
    differing
}

/// Draws the outline of `region` with a stroke of `thickness` pixels growing inwards.
pub fn draw_box(canvas: &mut RgbImage, region: Region, color: Rgb<u8>, thickness: u32) {
    for inset in 0..thickness {
        if region.width <= 2 * inset || region.height <= 2 * inset {
            break;
        }
        let rect = Rect::at((region.x + inset) as i32, (region.y + inset) as i32)
            .of_size(region.width - 2 * inset, region.height - 2 * inset);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Encodes an RGB image as PNG bytes.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut bytes);
    encoder.write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgb8)?;
    Ok(bytes)
}

/// Encodes a single-channel image (mask or diff) as PNG bytes.
pub fn encode_gray_png(image: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut bytes);
    encoder.write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::L8)?;
    Ok(bytes)
}
