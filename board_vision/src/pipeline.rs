// THEORY:
// The `pipeline` module is the top-level API of the inspection engine. It wires the
// core modules into one synchronous call: a (test, reference) pair goes in, a
// verdict with an annotated image comes out.
//
// Stages:
// 1.  **Decode**: Both inputs are decoded to 8-bit RGB. Failures are tagged with the
//     image's role so callers can tell a bad upload from a bad reference.
// 2.  **Align**: The test image is resized to the reference's exact dimensions
//     (bilinear). Matching sizes skip the resize entirely.
// 3.  **Normalize**: Both images get luminance equalization. This stage never fails.
// 4.  **Segment**: Lit-pixel masks for both images. They are not used by the
//     primary verdict; they feed diagnostics and optional verification.
// 5.  **Compare**: The `PatternComparator` produces the defect list and the
//     annotated image.
// 6.  **Verify** (optional): An attached `VerificationStrategy` adds its report.
// 7.  **Persist**: The annotated image is PNG-encoded and handed to the
//     `ArtifactStore`. A store failure is reported next to the verdict, never
//     instead of it.
//
// The pipeline holds no mutable state, so one instance can serve concurrent
// inspections (see `parallel_pipeline`).

use crate::config::InspectionConfig;
use crate::core_modules::artifact_store::ArtifactStore;
use crate::core_modules::grid_histogram::{NormalizedFrames, VerificationReport, VerificationStrategy};
use crate::core_modules::image_helper::encode_png;
use crate::core_modules::led_segmenter::{LedSegmenter, Mask};
use crate::core_modules::normalizer::ImageNormalizer;
use crate::core_modules::pattern_comparator::PatternComparator;
use crate::error::{ImageRole, InspectionError, InspectionOutcome, PersistenceError};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::defect::{Defect, DetectionMethod};

/// An image handed to the pipeline, either on disk or already in memory.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Path(PathBuf),
    /// Encoded image bytes plus the name they were uploaded under.
    Bytes { name: String, data: Arc<[u8]> },
}

impl ImageInput {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// The file name this image is known by.
    pub fn name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Bytes { name, .. } => name.clone(),
        }
    }

    fn decode(&self, role: ImageRole) -> InspectionOutcome<RgbImage> {
        let decoded = match self {
            Self::Path(path) => image::open(path),
            Self::Bytes { data, .. } => image::load_from_memory(data),
        }
        .map_err(|source| InspectionError::Decode { role, source })?;

        let image = decoded.to_rgb8();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(InspectionError::Dimension { role, width, height });
        }
        Ok(image)
    }
}

/// The verdict handed to consumers. Its JSON shape is a stable contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectionResult {
    pub approved: bool,
    pub defects: Vec<Defect>,
    pub defect_count: usize,
    /// Store reference of the annotated image; empty when persisting failed.
    pub annotated_image_ref: String,
    /// Name of the test image that was analyzed.
    pub analyzed_image_ref: String,
}

impl InspectionResult {
    fn new(defects: Vec<Defect>, annotated_image_ref: String, analyzed_image_ref: String) -> Self {
        Self {
            approved: defects.is_empty(),
            defect_count: defects.len(),
            defects,
            annotated_image_ref,
            analyzed_image_ref,
        }
    }
}

/// Lit-pixel masks of both images, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct InspectionMasks {
    pub reference: Mask,
    pub test: Mask,
}

/// Everything one inspection produced.
#[derive(Debug)]
pub struct InspectionReport {
    pub result: InspectionResult,
    pub annotated_image: RgbImage,
    pub normalized_reference: RgbImage,
    pub normalized_test: RgbImage,
    pub masks: InspectionMasks,
    pub verification: Option<VerificationReport>,
    /// Set when the annotated image could not be stored.
    pub persistence_error: Option<PersistenceError>,
}

/// The main, top-level struct for the inspection engine.
pub struct InspectionPipeline {
    config: InspectionConfig,
    normalizer: ImageNormalizer,
    segmenter: LedSegmenter,
    comparator: PatternComparator,
    verifier: Option<Arc<dyn VerificationStrategy>>,
    store: Arc<dyn ArtifactStore>,
}

impl InspectionPipeline {
    pub fn new(config: InspectionConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            normalizer: ImageNormalizer::new(config.normalizer.clone()),
            segmenter: LedSegmenter::new(config.segmenter.clone()),
            comparator: PatternComparator::new(config.comparator.clone()),
            verifier: None,
            store,
            config,
        }
    }

    /// Attaches a second-opinion strategy whose report rides along with every inspection.
    pub fn with_verifier(mut self, verifier: Arc<dyn VerificationStrategy>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn config(&self) -> &InspectionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn inspect(&self, test: &ImageInput, reference: &ImageInput) -> InspectionOutcome<InspectionReport> {
        let test_name = test.name();
        info!(test = %test_name, reference = %reference.name(), "inspection started");

        // Stage 1: Decode
        let reference_image = reference.decode(ImageRole::Reference)?;
        let test_image = test.decode(ImageRole::Test)?;

        // Stage 2: Align
        let test_image = align_to(&test_image, &reference_image);

        // Stage 3: Normalize
        let normalized_reference = self.normalizer.normalize(&reference_image);
        let normalized_test = self.normalizer.normalize(&test_image);

        // Stage 4: Segment
        let masks = InspectionMasks {
            reference: self.segmenter.segment(&normalized_reference)?,
            test: self.segmenter.segment(&normalized_test)?,
        };

        // Stage 5: Compare
        let comparison = self.comparator.compare(&normalized_reference, &normalized_test)?;
        debug!(
            regions = comparison.regions_checked,
            defects = comparison.defects.len(),
            "comparison finished"
        );

        // Stage 6: Verify
        let verification = match &self.verifier {
            Some(verifier) => {
                let frames = NormalizedFrames {
                    reference: &normalized_reference,
                    test: &normalized_test,
                    reference_mask: &masks.reference,
                    test_mask: &masks.test,
                };
                let report = verifier.verify(&frames)?;
                info!(strategy = verifier.name(), flags = report.total(), "verification attached");
                Some(report)
            }
            None => None,
        };

        // Stage 7: Persist
        let png = encode_png(&comparison.annotated).map_err(InspectionError::Encode)?;
        let (annotated_image_ref, persistence_error) = match self.store.store(&test_name, &png) {
            Ok(reference) => (reference, None),
            Err(err) => {
                warn!("annotated image not stored: {err}");
                (String::new(), Some(err))
            }
        };

        let result = InspectionResult::new(comparison.defects, annotated_image_ref, test_name);
        info!(
            approved = result.approved,
            defects = result.defect_count,
            "inspection finished"
        );

        Ok(InspectionReport {
            result,
            annotated_image: comparison.annotated,
            normalized_reference,
            normalized_test,
            masks,
            verification,
            persistence_error,
        })
    }
}

/// Resizes `test` to the dimensions of `reference` unless they already match.
fn align_to(test: &RgbImage, reference: &RgbImage) -> RgbImage {
    let (width, height) = reference.dimensions();
    if test.dimensions() == (width, height) {
        return test.clone();
    }
    debug!(from = ?test.dimensions(), to = ?(width, height), "resizing test image");
    imageops::resize(test, width, height, FilterType::Triangle)
}
