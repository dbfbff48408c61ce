// THEORY:
// Every tunable of the inspection engine lives in one value object that is
// handed to the `InspectionPipeline` at construction time. Nothing in the crate
// reads global state or creates directories as a side effect of being loaded;
// the storage paths are plain configuration and `StoragePaths::ensure_dirs`
// is the one explicit place where they are materialised on disk.
//
// The defaults reproduce the constants the production line was tuned with:
// 8x8 CLAHE tiles at clip limit 2.0, a brightness cut of 200, 5x5 morphology,
// 50 px² minimum LED area, 5 px expansion margin and a 30 % anomaly threshold.

use crate::core_modules::contours::ContourOrder;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extensions accepted from upload collaborators (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Returns true when `filename` carries one of the `ALLOWED_EXTENSIONS`.
pub fn is_allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Configuration for the full inspection, grouped per stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionConfig {
    pub normalizer: NormalizerConfig,
    pub segmenter: SegmenterConfig,
    pub comparator: ComparatorConfig,
    pub grid_histogram: GridHistogramConfig,
    pub paths: StoragePaths,
}

/// Contrast-limited adaptive histogram equalization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub clip_limit: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            tiles_x: 8,
            tiles_y: 8,
            clip_limit: 2.0,
        }
    }
}

/// An inclusive range in 8-bit HSV space (H in 0..=180, S and V in 0..=255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }
}

/// Lit-pixel segmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Yellow-ish LED colours.
    pub yellow: HsvRange,
    /// Near-white, low-saturation bright pixels.
    pub white: HsvRange,
    /// Gray level above which a pixel counts as a saturated highlight.
    pub brightness_threshold: u8,
    /// Chebyshev radius of the square structuring element (2 => 5x5).
    pub kernel_radius: u8,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            yellow: HsvRange {
                lower: [15, 70, 100],
                upper: [45, 255, 255],
            },
            white: HsvRange {
                lower: [0, 0, 180],
                upper: [180, 30, 255],
            },
            brightness_threshold: 200,
            kernel_radius: 2,
        }
    }
}

/// Primary detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorConfig {
    /// Gray level above which a pixel is binarized to 255.
    pub binary_threshold: u8,
    /// Regions with a polygon area at or below this are treated as noise.
    pub min_region_area: f64,
    /// Padding added on each side of a region's bounding box before cropping.
    pub margin: u32,
    /// Percentage of differing pixels above which a region is defective.
    pub anomaly_threshold: f64,
    pub contour_order: ContourOrder,
    /// Stroke width of the boxes drawn on the annotated image.
    pub box_thickness: u32,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            binary_threshold: 200,
            min_region_area: 50.0,
            margin: 5,
            anomaly_threshold: 30.0,
            contour_order: ContourOrder::RasterScan,
            box_thickness: 2,
        }
    }
}

/// Supplementary grid-histogram and contour-diff verification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridHistogramConfig {
    pub grid_size: u32,
    pub bins_per_channel: u32,
    /// Cells whose histogram correlation drops below this are flagged.
    pub correlation_floor: f64,
    /// Mask difference level above which a pixel is kept.
    pub diff_threshold: u8,
    /// Chebyshev radius of the opening applied to the difference (3 => 7x7).
    pub opening_radius: u8,
    /// Lower bound for the contour-diff area cut.
    pub min_defect_area: f64,
    /// Fraction of the average reference LED area used as the area cut.
    pub led_area_fraction: f64,
    /// Reference LED contours at or below this area are ignored for the average.
    pub min_led_area: f64,
    /// Average LED area assumed when the reference mask has no LEDs.
    pub default_led_area: f64,
}

impl Default for GridHistogramConfig {
    fn default() -> Self {
        Self {
            grid_size: 4,
            bins_per_channel: 32,
            correlation_floor: 0.7,
            diff_threshold: 50,
            opening_radius: 3,
            min_defect_area: 50.0,
            led_area_fraction: 0.10,
            min_led_area: 50.0,
            default_led_area: 500.0,
        }
    }
}

/// Where uploads live and where annotated results are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoragePaths {
    pub upload_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("static/images/uploads"),
            results_dir: PathBuf::from("static/images/results"),
        }
    }
}

impl StoragePaths {
    /// Creates both directories if they do not exist yet.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.upload_dir, &self.results_dir] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl InspectionConfig {
    /// Loads a JSON config; missing fields fall back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no stage can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.normalizer.tiles_x == 0 || self.normalizer.tiles_y == 0 {
            return Err(ConfigError::Invalid("normalizer tile grid must be non-zero".into()));
        }
        if !(self.normalizer.clip_limit > 0.0) {
            return Err(ConfigError::Invalid("normalizer clip limit must be positive".into()));
        }
        if self.comparator.anomaly_threshold < 0.0 {
            return Err(ConfigError::Invalid("anomaly threshold must not be negative".into()));
        }
        if self.grid_histogram.grid_size == 0 {
            return Err(ConfigError::Invalid("histogram grid size must be non-zero".into()));
        }
        let bins = self.grid_histogram.bins_per_channel;
        if bins == 0 || bins > 256 {
            return Err(ConfigError::Invalid(format!(
                "histogram bins per channel must be in 1..=256, got {bins}"
            )));
        }
        Ok(())
    }
}
