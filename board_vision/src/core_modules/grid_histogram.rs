// THEORY:
// The `GridHistogramValidator` is the supplementary verification strategy. It does
// not take part in the approve/reject decision; it is attached to an inspection
// when a second opinion is wanted, and it reports its own flags next to the
// primary result.
//
// It combines two independent sub-methods:
// 1.  **Grid Histogram Correlation**: Both normalized images are partitioned into an
//     N x N grid of cells (cell size by integer division, row-major order). Each
//     cell gets a joint 3-channel colour histogram, min-max normalized to [0, 1],
//     and the Pearson correlation between the reference and test histograms is
//     computed. Cells below the correlation floor are flagged.
// 2.  **Mask Contour Diff**: The lit-pixel masks are differenced, thresholded and
//     opened. Each external difference contour is flagged when its area exceeds
//     max(min_defect_area, fraction x average reference LED area) *and* its filled
//     polygon touches a lit reference pixel; the overlap test suppresses
//     differences caused by a global frame shift over unlit board.
//
// The reported total is the plain sum of both flag lists. The sub-methods are not
// deduplicated against each other, so one dead LED can be counted twice.

use crate::config::GridHistogramConfig;
use crate::core_modules::contours::{ContourOrder, LitRegion, external_regions};
use crate::core_modules::defect::{Defect, DetectionMethod};
use crate::core_modules::image_helper::{GREEN, MASK_ON, RED, absdiff, binarize, draw_box};
use crate::core_modules::led_segmenter::Mask;
use crate::core_modules::region::Region;
use crate::error::{InspectionError, InspectionOutcome};
use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_polygon_mut;
use imageproc::morphology::open;
use imageproc::point::Point as PolygonPoint;
use tracing::{debug, info};

/// The normalized images and masks a verification strategy works on.
#[derive(Debug, Clone, Copy)]
pub struct NormalizedFrames<'a> {
    pub reference: &'a RgbImage,
    pub test: &'a RgbImage,
    pub reference_mask: &'a Mask,
    pub test_mask: &'a Mask,
}

/// A pluggable, independent second opinion on an inspection.
pub trait VerificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn verify(&self, frames: &NormalizedFrames<'_>) -> InspectionOutcome<VerificationReport>;
}

/// A grid cell whose histogram decorrelated from the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct CellFlag {
    pub row: u32,
    pub col: u32,
    pub region: Region,
    pub correlation: f64,
}

/// A mask-difference contour that overlaps a reference LED.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourFlag {
    pub region: Region,
    pub area: f64,
    /// Lit reference pixels inside the filled contour.
    pub overlap: usize,
}

#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub strategy: &'static str,
    pub contour_flags: Vec<ContourFlag>,
    pub histogram_flags: Vec<CellFlag>,
    /// Thresholded and opened mask difference, kept for diagnostics.
    pub cleaned_diff: GrayImage,
    /// Normalized test image with flagged contours (red) and cells (green).
    pub annotated: RgbImage,
}

impl VerificationReport {
    /// Unweighted sum of both sub-methods.
    pub fn total(&self) -> usize {
        self.contour_flags.len() + self.histogram_flags.len()
    }

    /// All flags as defects: contour-diff flags first, then histogram cells.
    pub fn defects(&self) -> Vec<Defect> {
        let contour = self
            .contour_flags
            .iter()
            .map(|flag| (flag.region, DetectionMethod::ContourDiff));
        let cells = self
            .histogram_flags
            .iter()
            .map(|flag| (flag.region, DetectionMethod::HistogramCorrelation));
        contour
            .chain(cells)
            .enumerate()
            .map(|(i, (region, method))| Defect::new(i + 1, region, method))
            .collect()
    }
}

/// Row-major partition of an image into `grid_size` x `grid_size` cells.
#[derive(Debug, Clone, Copy)]
pub struct CellGrid {
    /// The number of cells per row and per column.
    pub grid_size: u32,
    /// The width of a single cell in pixels (image_width / grid_size).
    pub cell_width: u32,
    /// The height of a single cell in pixels (image_height / grid_size).
    pub cell_height: u32,
}

impl CellGrid {
    /// A zero `grid_size` yields a grid without cells.
    pub fn new(image_width: u32, image_height: u32, grid_size: u32) -> Self {
        Self {
            grid_size,
            cell_width: image_width.checked_div(grid_size).unwrap_or(0),
            cell_height: image_height.checked_div(grid_size).unwrap_or(0),
        }
    }

    /// `(row, col, region)` for every cell, row by row.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, Region)> + '_ {
        (0..self.grid_size * self.grid_size).map(move |cell_index| {
            let row = cell_index / self.grid_size;
            let col = cell_index % self.grid_size;
            let region = Region::new(
                col * self.cell_width,
                row * self.cell_height,
                self.cell_width,
                self.cell_height,
            );
            (row, col, region)
        })
    }
}

/// Grid-histogram plus mask-contour-diff verification.
#[derive(Debug, Clone)]
pub struct GridHistogramValidator {
    config: GridHistogramConfig,
}

impl GridHistogramValidator {
    pub fn new(config: GridHistogramConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridHistogramConfig {
        &self.config
    }

    /// Rejects grid and bin settings the histogram pass cannot work with.
    fn check_settings(&self) -> InspectionOutcome<()> {
        if self.config.grid_size == 0 {
            return Err(InspectionError::verification("histogram grid size must be non-zero"));
        }
        let bins = self.config.bins_per_channel;
        if !(1..=256).contains(&bins) {
            return Err(InspectionError::verification(format!(
                "histogram bins per channel must be in 1..=256, got {bins}"
            )));
        }
        Ok(())
    }

    /// Flags grid cells whose colour histograms correlate below the floor.
    pub fn histogram_pass(&self, reference: &RgbImage, test: &RgbImage) -> InspectionOutcome<Vec<CellFlag>> {
        self.check_settings()?;
        let (width, height) = reference.dimensions();
        let grid = CellGrid::new(width, height, self.config.grid_size);
        let bins = self.config.bins_per_channel;

        let mut flags = Vec::new();
        for (row, col, region) in grid.cells() {
            let mut reference_hist = color_histogram(reference, region, bins);
            let mut test_hist = color_histogram(test, region, bins);
            normalize_min_max(&mut reference_hist);
            normalize_min_max(&mut test_hist);

            let correlation = correlation(&reference_hist, &test_hist);
            if correlation < self.config.correlation_floor {
                info!(row, col, x = region.x, y = region.y, correlation, "histogram cell flagged");
                flags.push(CellFlag {
                    row,
                    col,
                    region,
                    correlation,
                });
            }
        }
        Ok(flags)
    }

    /// Flags mask-difference contours that overlap reference LEDs. Also returns the
    /// cleaned difference mask.
    pub fn contour_diff_pass(&self, reference_mask: &Mask, test_mask: &Mask) -> (Vec<ContourFlag>, GrayImage) {
        let diff = binarize(&absdiff(reference_mask, test_mask), self.config.diff_threshold);
        let cleaned = if self.config.opening_radius > 0 {
            open(&diff, Norm::LInf, self.config.opening_radius)
        } else {
            diff
        };

        let led_areas: Vec<f64> = external_regions(reference_mask, ContourOrder::RasterScan)
            .iter()
            .map(|led| led.area)
            .filter(|&area| area > self.config.min_led_area)
            .collect();
        let average_led_area = if led_areas.is_empty() {
            self.config.default_led_area
        } else {
            led_areas.iter().sum::<f64>() / led_areas.len() as f64
        };
        let min_area = self
            .config
            .min_defect_area
            .max(average_led_area * self.config.led_area_fraction);
        debug!(average_led_area, min_area, "contour-diff area cut");

        let mut flags = Vec::new();
        for contour in external_regions(&cleaned, ContourOrder::RasterScan) {
            if contour.area <= min_area {
                continue;
            }
            let overlap = filled_overlap(&contour, reference_mask);
            if overlap > 0 {
                info!(
                    x = contour.bounds.x,
                    y = contour.bounds.y,
                    area = contour.area,
                    overlap,
                    "difference contour flagged"
                );
                flags.push(ContourFlag {
                    region: contour.bounds,
                    area: contour.area,
                    overlap,
                });
            }
        }
        (flags, cleaned)
    }
}

impl Default for GridHistogramValidator {
    fn default() -> Self {
        Self::new(GridHistogramConfig::default())
    }
}

impl VerificationStrategy for GridHistogramValidator {
    fn name(&self) -> &'static str {
        "grid_histogram"
    }

    fn verify(&self, frames: &NormalizedFrames<'_>) -> InspectionOutcome<VerificationReport> {
        let dimensions = frames.reference.dimensions();
        if frames.test.dimensions() != dimensions
            || frames.reference_mask.dimensions() != dimensions
            || frames.test_mask.dimensions() != dimensions
        {
            return Err(InspectionError::verification(
                "frames and masks must share the reference dimensions",
            ));
        }

        self.check_settings()?;

        let (contour_flags, cleaned_diff) = self.contour_diff_pass(frames.reference_mask, frames.test_mask);
        let histogram_flags = self.histogram_pass(frames.reference, frames.test)?;

        let mut annotated = frames.test.clone();
        for contour in external_regions(&cleaned_diff, ContourOrder::RasterScan) {
            if contour_flags.iter().any(|flag| flag.region == contour.bounds) {
                for point in &contour.border {
                    annotated.put_pixel(point.x, point.y, RED);
                }
            }
        }
        for flag in &histogram_flags {
            draw_box(&mut annotated, flag.region, GREEN, 2);
        }

        info!(
            contour = contour_flags.len(),
            histogram = histogram_flags.len(),
            "verification complete"
        );
        Ok(VerificationReport {
            strategy: self.name(),
            contour_flags,
            histogram_flags,
            cleaned_diff,
            annotated,
        })
    }
}

/// Joint RGB histogram of `region` with `bins` bins per channel over 0..256.
fn color_histogram(image: &RgbImage, region: Region, bins: u32) -> Vec<f64> {
    let bins = bins as usize;
    let mut hist = vec![0.0; bins * bins * bins];
    for y in region.y..region.y + region.height {
        for x in region.x..region.x + region.width {
            let rgb = image.get_pixel(x, y);
            let bin = |value: u8| value as usize * bins / 256;
            hist[(bin(rgb[0]) * bins + bin(rgb[1])) * bins + bin(rgb[2])] += 1.0;
        }
    }
    hist
}

/// Rescales to [0, 1]. A constant histogram becomes all zeros.
fn normalize_min_max(hist: &mut [f64]) {
    let min = hist.iter().copied().fold(f64::INFINITY, f64::min);
    let max = hist.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    let scale = if range > f64::EPSILON { 1.0 / range } else { 0.0 };
    for value in hist.iter_mut() {
        *value = (*value - min) * scale;
    }
}

/// Pearson correlation of two equally sized histograms; 1.0 when either has no variance.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    if n == 0.0 {
        return 1.0;
    }
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut variance_a = 0.0;
    let mut variance_b = 0.0;
    for (&va, &vb) in a.iter().zip(b) {
        let da = va - mean_a;
        let db = vb - mean_b;
        numerator += da * db;
        variance_a += da * da;
        variance_b += db * db;
    }

    let denominator = variance_a * variance_b;
    if denominator.abs() > f64::EPSILON {
        numerator / denominator.sqrt()
    } else {
        1.0
    }
}

/// Lit `mask` pixels inside the filled polygon of `contour`.
fn filled_overlap(contour: &LitRegion, mask: &Mask) -> usize {
    let (width, height) = mask.dimensions();
    let mut filled = GrayImage::new(width, height);

    let mut polygon: Vec<PolygonPoint<i32>> = contour
        .border
        .iter()
        .map(|p| PolygonPoint::new(p.x as i32, p.y as i32))
        .collect();
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }
    if polygon.len() >= 3 {
        draw_polygon_mut(&mut filled, &polygon, Luma([MASK_ON]));
    }
    for point in &contour.border {
        filled.put_pixel(point.x, point.y, Luma([MASK_ON]));
    }

    filled
        .as_raw()
        .iter()
        .zip(mask.as_raw())
        .filter(|&(&inside, &lit)| inside != 0 && lit != 0)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn square_mask(squares: &[(u32, u32, u32)]) -> Mask {
        let mut mask = GrayImage::new(80, 80);
        for &(x0, y0, size) in squares {
            for y in y0..y0 + size {
                for x in x0..x0 + size {
                    mask.put_pixel(x, y, Luma([MASK_ON]));
                }
            }
        }
        mask
    }

    fn textured_board() -> RgbImage {
        RgbImage::from_fn(80, 80, |x, y| Rgb([(x * 3) as u8, (y * 3) as u8, ((x + y) * 2) as u8]))
    }

    #[test]
    fn grid_cells_are_row_major() {
        let grid = CellGrid::new(100, 50, 4);
        let cells: Vec<_> = grid.cells().collect();
        assert_eq!(cells.len(), 16);
        assert_eq!(cells[1], (0, 1, Region::new(25, 0, 25, 12)));
        assert_eq!(cells[4], (1, 0, Region::new(0, 12, 25, 12)));
    }

    #[test]
    fn correlation_bounds() {
        let a = [0.0, 1.0, 0.5, 0.25];
        assert!((correlation(&a, &a) - 1.0).abs() < 1e-12);
        let inverted: Vec<f64> = a.iter().map(|v| 1.0 - v).collect();
        assert!((correlation(&a, &inverted) + 1.0).abs() < 1e-12);
        assert_eq!(correlation(&[0.0; 4], &a), 1.0);
    }

    #[test]
    fn identical_images_raise_no_histogram_flags() {
        let board = textured_board();
        assert!(GridHistogramValidator::default().histogram_pass(&board, &board).unwrap().is_empty());
    }

    #[test]
    fn repainted_cell_is_flagged() {
        let reference = textured_board();
        let mut test = reference.clone();
        for y in 20..40 {
            for x in 60..80 {
                test.put_pixel(x, y, Rgb([255, 255, 0]));
            }
        }
        let flags = GridHistogramValidator::default().histogram_pass(&reference, &test).unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!((flags[0].row, flags[0].col), (1, 3));
        assert!(flags[0].correlation < 0.7);
    }

    #[test]
    fn missing_led_is_a_contour_flag() {
        let reference = square_mask(&[(10, 10, 12), (50, 50, 12)]);
        let test = square_mask(&[(10, 10, 12)]);
        let (flags, cleaned) = GridHistogramValidator::default().contour_diff_pass(&reference, &test);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].region, Region::new(50, 50, 12, 12));
        assert!(flags[0].overlap > 0);
        assert_eq!(cleaned.dimensions(), (80, 80));
    }

    #[test]
    fn extra_light_off_reference_leds_is_ignored() {
        let reference = square_mask(&[(10, 10, 12)]);
        let test = square_mask(&[(10, 10, 12), (50, 50, 12)]);
        let (flags, _) = GridHistogramValidator::default().contour_diff_pass(&reference, &test);
        assert!(flags.is_empty());
    }

    #[test]
    fn total_is_the_unweighted_sum() {
        let reference = textured_board();
        let mut test = reference.clone();
        for y in 50..62 {
            for x in 50..62 {
                test.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let reference_mask = square_mask(&[(50, 50, 12)]);
        let test_mask = square_mask(&[]);
        let frames = NormalizedFrames {
            reference: &reference,
            test: &test,
            reference_mask: &reference_mask,
            test_mask: &test_mask,
        };
        let report = GridHistogramValidator::default().verify(&frames).unwrap();
        assert_eq!(report.contour_flags.len(), 1);
        assert_eq!(report.total(), report.contour_flags.len() + report.histogram_flags.len());
        let defects = report.defects();
        assert_eq!(defects.len(), report.total());
        assert_eq!(defects[0].source_method, DetectionMethod::ContourDiff);
        assert_eq!(report.strategy, "grid_histogram");
    }

    #[test]
    fn mismatched_frames_are_a_verification_failure() {
        let board = textured_board();
        let small = GrayImage::new(10, 10);
        let mask = square_mask(&[]);
        let frames = NormalizedFrames {
            reference: &board,
            test: &board,
            reference_mask: &small,
            test_mask: &mask,
        };
        assert!(matches!(
            GridHistogramValidator::default().verify(&frames),
            Err(InspectionError::Verification(_))
        ));
    }

    fn validator(tune: impl FnOnce(&mut GridHistogramConfig)) -> GridHistogramValidator {
        let mut config = GridHistogramConfig::default();
        tune(&mut config);
        GridHistogramValidator::new(config)
    }

    #[test]
    fn zero_grid_yields_no_cells() {
        assert_eq!(CellGrid::new(80, 80, 0).cells().count(), 0);
    }

    #[test]
    fn unusable_grid_settings_are_verification_failures() {
        let board = textured_board();
        let mask = square_mask(&[(10, 10, 12)]);
        let frames = NormalizedFrames {
            reference: &board,
            test: &board,
            reference_mask: &mask,
            test_mask: &mask,
        };

        let zero_grid = validator(|config| config.grid_size = 0);
        assert!(matches!(zero_grid.verify(&frames), Err(InspectionError::Verification(_))));

        let zero_bins = validator(|config| config.bins_per_channel = 0);
        assert!(matches!(
            zero_bins.histogram_pass(&board, &board),
            Err(InspectionError::Verification(_))
        ));
        assert!(matches!(zero_bins.verify(&frames), Err(InspectionError::Verification(_))));

        let too_many_bins = validator(|config| config.bins_per_channel = 257);
        assert!(too_many_bins.verify(&frames).is_err());
    }

    #[test]
    fn difference_below_the_led_fraction_cut_is_ignored() {
        // One 40x40 LED (area 1521) puts the cut at 0.10 x 1521, above a 12x12 gap (area 121).
        let reference = square_mask(&[(10, 10, 40)]);
        let mut test = reference.clone();
        for y in 20..32 {
            for x in 20..32 {
                test.put_pixel(x, y, Luma([0]));
            }
        }

        let (flags, _) = GridHistogramValidator::default().contour_diff_pass(&reference, &test);
        assert!(flags.is_empty());

        let (flags, _) = validator(|config| config.led_area_fraction = 0.0).contour_diff_pass(&reference, &test);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].region, Region::new(20, 20, 12, 12));
        assert_eq!(flags[0].area, 121.0);
    }

    #[test]
    fn default_led_area_applies_when_no_led_counts() {
        // The only reference LED (area 121) is below min_led_area, so the average falls
        // back to default_led_area.
        let reference = square_mask(&[(50, 50, 12)]);
        let test = square_mask(&[]);

        let small_default = validator(|config| {
            config.min_led_area = 10_000.0;
            config.default_led_area = 500.0;
        });
        let (flags, _) = small_default.contour_diff_pass(&reference, &test);
        assert_eq!(flags.len(), 1);

        let large_default = validator(|config| {
            config.min_led_area = 10_000.0;
            config.default_led_area = 2_000.0;
        });
        let (flags, _) = large_default.contour_diff_pass(&reference, &test);
        assert!(flags.is_empty());
    }
}
