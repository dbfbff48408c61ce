// tests/inspection_scenarios.rs
//
// End-to-end inspections through the public API: images on disk, artifacts written
// by the filesystem store, configuration loaded from JSON.

use board_vision::{
    ArtifactStore, CleanupStatus, FsArtifactStore, GridHistogramValidator, ImageInput, ImageRole,
    InspectionConfig, InspectionError, InspectionPipeline,
};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BOARD: Rgb<u8> = Rgb([18, 60, 30]);
const LED: Rgb<u8> = Rgb([255, 230, 120]);

fn board(leds: &[(u32, u32)]) -> RgbImage {
    let mut image = RgbImage::from_pixel(160, 120, BOARD);
    for &(x0, y0) in leds {
        for y in y0..y0 + 12 {
            for x in x0..x0 + 12 {
                image.put_pixel(x, y, LED);
            }
        }
    }
    image
}

fn save(dir: &Path, name: &str, image: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}

fn fs_pipeline(results: &Path) -> (InspectionPipeline, Arc<FsArtifactStore>) {
    let store = Arc::new(FsArtifactStore::new(results));
    (InspectionPipeline::new(InspectionConfig::default(), store.clone()), store)
}

#[test]
fn known_good_board_is_approved_and_artifact_written() {
    let dir = tempfile::tempdir().unwrap();
    let leds = [(20, 20), (70, 20), (120, 20), (20, 80), (70, 80), (120, 80)];
    let reference = save(dir.path(), "golden.png", &board(&leds));
    let test = save(dir.path(), "unit_0001.png", &board(&leds));
    let (pipeline, store) = fs_pipeline(&dir.path().join("results"));

    let report = pipeline
        .inspect(&ImageInput::path(&test), &ImageInput::path(&reference))
        .unwrap();

    assert!(report.result.approved);
    assert_eq!(report.result.defect_count, 0);
    let artifact = store.path_of(&report.result.annotated_image_ref);
    assert!(artifact.exists());
    assert_eq!(image::open(&artifact).unwrap().to_rgb8().dimensions(), (160, 120));
}

#[test]
fn missing_led_is_reported_at_its_position() {
    let dir = tempfile::tempdir().unwrap();
    let reference = save(dir.path(), "golden.png", &board(&[(20, 20), (120, 80)]));
    let test = save(dir.path(), "unit_0002.png", &board(&[(20, 20)]));
    let (pipeline, _) = fs_pipeline(&dir.path().join("results"));

    let result = pipeline
        .inspect(&ImageInput::path(&test), &ImageInput::path(&reference))
        .unwrap()
        .result;

    assert!(!result.approved);
    assert_eq!(result.defect_count, 1);
    let defect = &result.defects[0];
    assert_eq!(defect.index, 1);
    assert_eq!((defect.x, defect.y), (120, 80));
    assert_eq!(defect.label, "Defect #1: anomaly at position (120, 80)");
}

#[test]
fn empty_upload_fails_without_writing_an_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let reference = save(dir.path(), "golden.png", &board(&[(20, 20)]));
    let test = dir.path().join("unit_0003.png");
    std::fs::write(&test, b"").unwrap();
    let results = dir.path().join("results");
    let (pipeline, _) = fs_pipeline(&results);

    let err = pipeline
        .inspect(&ImageInput::path(&test), &ImageInput::path(&reference))
        .unwrap_err();

    assert!(matches!(err, InspectionError::Decode { role: ImageRole::Test, .. }));
    let written = std::fs::read_dir(&results).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(written, 0);
}

#[test]
fn missing_reference_file_is_a_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let test = save(dir.path(), "unit_0004.png", &board(&[(20, 20)]));
    let (pipeline, _) = fs_pipeline(&dir.path().join("results"));

    let err = pipeline
        .inspect(&ImageInput::path(&test), &ImageInput::path(dir.path().join("nope.png")))
        .unwrap_err();
    assert!(matches!(err, InspectionError::Decode { role: ImageRole::Reference, .. }));
}

#[test]
fn cleanup_of_stored_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let reference = save(dir.path(), "golden.png", &board(&[(20, 20)]));
    let test = save(dir.path(), "unit_0005.png", &board(&[]));
    let (pipeline, store) = fs_pipeline(&dir.path().join("results"));

    let result = pipeline
        .inspect(&ImageInput::path(&test), &ImageInput::path(&reference))
        .unwrap()
        .result;
    assert_eq!(store.remove(&result.annotated_image_ref), CleanupStatus::Removed);
    assert_eq!(store.remove(&result.annotated_image_ref), CleanupStatus::Missing);
}

#[test]
fn config_file_tunes_the_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("inspection.json");
    std::fs::write(&config_path, r#"{ "comparator": { "anomaly_threshold": 1000.0 } }"#).unwrap();
    let config = InspectionConfig::from_json_file(&config_path).unwrap();
    config.validate().unwrap();

    let reference = save(dir.path(), "golden.png", &board(&[(20, 20)]));
    let test = save(dir.path(), "unit_0006.png", &board(&[]));
    let store = Arc::new(FsArtifactStore::new(dir.path().join("results")));
    let pipeline = InspectionPipeline::new(config, store);

    let result = pipeline
        .inspect(&ImageInput::path(&test), &ImageInput::path(&reference))
        .unwrap()
        .result;
    assert!(result.approved);
}

#[test]
fn verification_runs_alongside_the_primary_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let reference = save(dir.path(), "golden.png", &board(&[(20, 20), (120, 80)]));
    let test = save(dir.path(), "unit_0007.png", &board(&[(20, 20)]));
    let (pipeline, _) = fs_pipeline(&dir.path().join("results"));
    let pipeline = pipeline.with_verifier(Arc::new(GridHistogramValidator::default()));

    let report = pipeline
        .inspect(&ImageInput::path(&test), &ImageInput::path(&reference))
        .unwrap();

    assert_eq!(report.result.defect_count, 1);
    let verification = report.verification.unwrap();
    assert!(!verification.contour_flags.is_empty());
    assert_eq!(
        verification.defects().len(),
        verification.contour_flags.len() + verification.histogram_flags.len()
    );
}
