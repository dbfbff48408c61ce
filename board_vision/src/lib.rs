// THEORY:
// This file is the main entry point for the `board_vision` library crate, an
// automated optical inspection engine for LED circuit boards. A photo of a board
// under test is compared against a photo of a known-good board; lit LEDs that are
// missing or wrong in the test photo become numbered defects.
//
// The primary export is the `InspectionPipeline` with its data structures
// (`InspectionConfig`, `InspectionResult`, `InspectionReport`, ...). The pipeline
// depends on storage only through the `ArtifactStore` trait and on optional second
// opinions only through the `VerificationStrategy` trait. The individual
// algorithms in `core_modules` stay public so that diagnostic tools can run them
// stage by stage.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{InspectionConfig, is_allowed_file};
pub use core_modules::artifact_store::{ArtifactStore, CleanupStatus, FsArtifactStore, MemoryArtifactStore};
pub use core_modules::grid_histogram::{GridHistogramValidator, VerificationReport, VerificationStrategy};
pub use error::{ConfigError, ImageRole, InspectionError, InspectionOutcome, PersistenceError};
pub use parallel_pipeline::{InspectionPool, InspectionRequest};
pub use pipeline::{Defect, DetectionMethod, ImageInput, InspectionPipeline, InspectionReport, InspectionResult};
