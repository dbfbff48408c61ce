// THEORY:
// Contour extraction turns a binary mask into a list of lit regions. We trace
// borders with `imageproc::contours::find_contours` (Suzuki-Abe border following)
// and keep only the *external* borders: outer borders whose parent is `None`,
// i.e. components that are not nested inside a hole of another component.
//
// Ordering is part of the output contract, because defect numbers follow it:
// - `RasterScan` (default): the order in which the border-following pass meets
//   each border's first pixel while scanning rows top to bottom and columns left
//   to right. This is exactly the order `find_contours` produces.
// - `ReverseRasterScan`: the same list reversed, for parity with libraries that
//   report the most recently discovered border first.
// Both are pure functions of the mask, so numbering is stable across runs.
//
// Areas are polygon (shoelace) areas over the traced border pixels, so a filled
// 10x10 square has area 81 (the polygon through the border pixel centres).

use crate::core_modules::region::{Point, Region};
use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use serde::{Deserialize, Serialize};

/// Canonical traversal order of external regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourOrder {
    #[default]
    RasterScan,
    ReverseRasterScan,
}

/// One external connected region of a binary mask.
#[derive(Debug, Clone)]
pub struct LitRegion {
    /// Border pixels in tracing order.
    pub border: Vec<Point>,
    /// Shoelace area of the border polygon.
    pub area: f64,
    pub bounds: Region,
}

/// Extracts the external regions of `mask` (non-zero pixels are foreground).
pub fn external_regions(mask: &GrayImage, order: ContourOrder) -> Vec<LitRegion> {
    let mut regions: Vec<LitRegion> = find_contours::<u32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .filter_map(|contour| {
            let border: Vec<Point> = contour.points.iter().map(|p| Point { x: p.x, y: p.y }).collect();
            let bounds = Region::bounding(border.iter().copied())?;
            Some(LitRegion {
                area: polygon_area(&border),
                border,
                bounds,
            })
        })
        .collect();

    if order == ContourOrder::ReverseRasterScan {
        regions.reverse();
    }
    regions
}

/// Shoelace area of a closed polygon. Degenerate polygons have zero area.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for (i, current) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        twice_area += current.x as i64 * next.y as i64 - next.x as i64 * current.y as i64;
    }
    twice_area.abs() as f64 / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask_with_squares(squares: &[(u32, u32, u32)]) -> GrayImage {
        let mut mask = GrayImage::new(60, 60);
        for &(x0, y0, size) in squares {
            for y in y0..y0 + size {
                for x in x0..x0 + size {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        mask
    }

    #[test]
    fn square_region_has_pixel_centre_area() {
        let regions = external_regions(&mask_with_squares(&[(20, 20, 10)]), ContourOrder::RasterScan);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounds, Region::new(20, 20, 10, 10));
        assert_eq!(regions[0].area, 81.0);
    }

    #[test]
    fn raster_order_follows_first_border_pixel() {
        // The lower-left square starts on a later row than the upper-right one.
        let mask = mask_with_squares(&[(5, 40, 8), (40, 5, 8)]);
        let raster = external_regions(&mask, ContourOrder::RasterScan);
        assert_eq!(raster[0].bounds.top_left(), Point { x: 40, y: 5 });
        assert_eq!(raster[1].bounds.top_left(), Point { x: 5, y: 40 });

        let reversed = external_regions(&mask, ContourOrder::ReverseRasterScan);
        assert_eq!(reversed[0].bounds.top_left(), Point { x: 5, y: 40 });
    }

    #[test]
    fn nested_components_are_not_external() {
        // A ring with a dot inside its hole yields one external region.
        let mut mask = mask_with_squares(&[(10, 10, 30)]);
        for y in 15..35 {
            for x in 15..35 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        for y in 22..26 {
            for x in 22..26 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let regions = external_regions(&mask, ContourOrder::RasterScan);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounds, Region::new(10, 10, 30, 30));
    }

    #[test]
    fn empty_mask_has_no_regions() {
        assert!(external_regions(&GrayImage::new(8, 8), ContourOrder::RasterScan).is_empty());
    }

    #[test]
    fn shoelace_of_degenerate_polygon_is_zero() {
        assert_eq!(polygon_area(&[Point { x: 1, y: 1 }, Point { x: 4, y: 1 }]), 0.0);
    }
}
