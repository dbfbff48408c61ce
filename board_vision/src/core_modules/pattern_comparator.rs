// THEORY:
// The `PatternComparator` is the primary defect detector. It asks one question per
// reference LED: "does the test board look the same where this LED should be?"
//
// Key algorithm steps:
// 1.  **Binarize**: Both normalized images are reduced to gray and cut at a fixed
//     brightness (> threshold -> 255).
// 2.  **Reference Regions**: External contours of the binarized reference are the
//     expected LEDs. Regions with a polygon area at or below the noise floor are
//     dropped.
// 3.  **Expand**: Each bounding box grows by a fixed margin, clipped to the image,
//     so that a slightly shifted LED is still inside the crop.
// 4.  **Region Diff**: The same expanded window is compared in both binarized
//     images. The number of differing pixels, relative to the area of the
//     un-expanded LED box, is the region's difference percentage.
// 5.  **Verdict**: Regions above the anomaly threshold become `Defect`s, numbered in
//     discovery order (see `contours::ContourOrder`), and their expanded box is
//     drawn on a copy of the normalized test image.
//
// The comparator is a stateless utility: identical inputs give identical defects,
// identical numbering and an identical annotated image.

use crate::config::ComparatorConfig;
use crate::core_modules::contours::external_regions;
use crate::core_modules::defect::{Defect, DetectionMethod};
use crate::core_modules::image_helper::{RED, binarize, count_differences, draw_box, to_gray};
use crate::core_modules::region::Region;
use crate::error::{InspectionError, InspectionOutcome};
use image::RgbImage;
use tracing::{debug, info};

/// Output of one comparison: defects in discovery order plus the annotated test image.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub defects: Vec<Defect>,
    pub annotated: RgbImage,
    /// Number of reference regions that survived the noise floor.
    pub regions_checked: usize,
}

/// Region-wise comparison of reference LEDs against the test image.
#[derive(Debug, Clone)]
pub struct PatternComparator {
    config: ComparatorConfig,
}

impl PatternComparator {
    pub fn new(config: ComparatorConfig) -> Self {
        Self { config }
    }

    pub fn compare(&self, reference: &RgbImage, test: &RgbImage) -> InspectionOutcome<Comparison> {
        if reference.dimensions() != test.dimensions() {
            return Err(InspectionError::comparison(format!(
                "reference is {:?} but test is {:?}",
                reference.dimensions(),
                test.dimensions()
            )));
        }
        let (width, height) = reference.dimensions();

        // --- 1. Binarize ---
        let reference_binary = binarize(&to_gray(reference), self.config.binary_threshold);
        let test_binary = binarize(&to_gray(test), self.config.binary_threshold);

        // --- 2. Reference Regions ---
        let regions: Vec<Region> = external_regions(&reference_binary, self.config.contour_order)
            .into_iter()
            .filter(|region| region.area > self.config.min_region_area)
            .map(|region| region.bounds)
            .collect();
        debug!(regions = regions.len(), "reference regions above noise floor");

        let mut defects = Vec::new();
        let mut annotated = test.clone();

        for region in &regions {
            // --- 3. Expand ---
            let window = region.expand(self.config.margin, width, height);

            // --- 4. Region Diff ---
            let differing = count_differences(&reference_binary, &test_binary, window);
            let difference_pct = differing as f64 / region.area() as f64 * 100.0;

            // --- 5. Verdict ---
            if difference_pct > self.config.anomaly_threshold {
                let defect = Defect::new(defects.len() + 1, *region, DetectionMethod::PatternComparison);
                info!(
                    index = defect.index,
                    x = defect.x,
                    y = defect.y,
                    difference_pct,
                    "region flagged"
                );
                draw_box(&mut annotated, window, RED, self.config.box_thickness);
                defects.push(defect);
            }
        }

        Ok(Comparison {
            defects,
            annotated,
            regions_checked: regions.len(),
        })
    }
}

impl Default for PatternComparator {
    fn default() -> Self {
        Self::new(ComparatorConfig::default())
    }
}
