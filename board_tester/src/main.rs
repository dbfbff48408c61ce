//! board_tester: command-line harness for board_vision inspections.

use anyhow::{Context, Result, bail};
use board_vision::core_modules::image_helper::{encode_gray_png, encode_png};
use board_vision::{
    FsArtifactStore, GridHistogramValidator, ImageInput, InspectionConfig, InspectionPipeline, VerificationReport,
    is_allowed_file,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

#[derive(Parser)]
#[command(name = "board_tester")]
#[command(about = "Inspect LED boards against a known-good reference")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect one board and print the result JSON.
    Inspect {
        /// Known-good reference image.
        #[arg(long)]
        reference: PathBuf,

        /// Image of the board under test.
        #[arg(long)]
        test: PathBuf,

        /// Inspection config (JSON). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Where annotated images go. Overrides the config's results directory.
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Also run the grid-histogram verification and log its counts.
        #[arg(long)]
        with_verification: bool,
    },
    /// Run primary and grid-histogram detection and dump every intermediate image.
    Verify {
        /// Known-good board image.
        #[arg(long)]
        good: PathBuf,

        /// Board image expected to contain defects.
        #[arg(long)]
        defective: PathBuf,

        /// Directory for the intermediate PNGs.
        #[arg(long)]
        out_dir: PathBuf,

        /// Inspection config (JSON).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            reference,
            test,
            config,
            results_dir,
            with_verification,
        } => run_inspect(&reference, &test, config.as_deref(), results_dir, with_verification),
        Commands::Verify {
            good,
            defective,
            out_dir,
            config,
        } => run_verify(&good, &defective, &out_dir, config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<InspectionConfig> {
    let config = match path {
        Some(path) => InspectionConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => InspectionConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn check_extension(path: &Path) -> Result<()> {
    let name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    if !is_allowed_file(&name) {
        bail!("{} is not a png, jpg, jpeg or gif file", path.display());
    }
    Ok(())
}

/// Grid-histogram verification using the loaded config's settings.
fn verifier_for(config: &InspectionConfig) -> GridHistogramValidator {
    GridHistogramValidator::new(config.grid_histogram.clone())
}

/// `verify` succeeds on contour-diff plus histogram flags; the primary count is only logged.
fn verification_found_defects(verification: &VerificationReport) -> bool {
    verification.total() > 0
}

fn run_inspect(
    reference: &Path,
    test: &Path,
    config_path: Option<&Path>,
    results_dir: Option<PathBuf>,
    with_verification: bool,
) -> Result<ExitCode> {
    check_extension(reference)?;
    check_extension(test)?;

    let mut config = load_config(config_path)?;
    if let Some(results_dir) = results_dir {
        config.paths.results_dir = results_dir;
    }
    config.paths.ensure_dirs()?;

    let validator = with_verification.then(|| verifier_for(&config));
    let store = Arc::new(FsArtifactStore::new(&config.paths.results_dir));
    let mut pipeline = InspectionPipeline::new(config, store);
    if let Some(validator) = validator {
        pipeline = pipeline.with_verifier(Arc::new(validator));
    }

    let report = pipeline
        .inspect(&ImageInput::path(test), &ImageInput::path(reference))
        .context("inspection failed")?;

    if let Some(err) = &report.persistence_error {
        tracing::warn!("annotated image was not saved: {err}");
    }
    if let Some(verification) = &report.verification {
        info!(
            contour = verification.contour_flags.len(),
            histogram = verification.histogram_flags.len(),
            total = verification.total(),
            "grid-histogram verification"
        );
    }

    println!("{}", serde_json::to_string_pretty(&report.result)?);
    Ok(ExitCode::SUCCESS)
}

fn run_verify(good: &Path, defective: &Path, out_dir: &Path, config_path: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let validator = verifier_for(&config);
    let store = Arc::new(FsArtifactStore::new(out_dir));
    let pipeline = InspectionPipeline::new(config, store).with_verifier(Arc::new(validator));

    info!("Good image: {}", good.display());
    info!("Defective image: {}", defective.display());
    let report = pipeline
        .inspect(&ImageInput::path(defective), &ImageInput::path(good))
        .context("inspection failed")?;

    let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let write = |name: &str, png: Vec<u8>| -> Result<()> {
        let path = out_dir.join(format!("{name}_{stamp}.png"));
        std::fs::write(&path, png).with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {}", path.display());
        Ok(())
    };

    write("normalized_good", encode_png(&report.normalized_reference)?)?;
    write("normalized_defective", encode_png(&report.normalized_test)?)?;
    write("mask_good", encode_gray_png(&report.masks.reference)?)?;
    write("mask_defective", encode_gray_png(&report.masks.test)?)?;
    write("result_primary", encode_png(&report.annotated_image)?)?;

    let verification = report
        .verification
        .as_ref()
        .context("verification report missing")?;
    write("diff_cleaned", encode_gray_png(&verification.cleaned_diff)?)?;
    write("result_verification", encode_png(&verification.annotated)?)?;

    info!("Primary method defects: {}", report.result.defect_count);
    info!("Histogram method defects: {}", verification.histogram_flags.len());
    info!("Contour method defects: {}", verification.contour_flags.len());
    info!("Verification total: {}", verification.total());

    if !verification_found_defects(verification) {
        tracing::error!("No defects detected in the defective image");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_vision::core_modules::grid_histogram::ContourFlag;
    use board_vision::core_modules::region::Region;
    use image::{GrayImage, RgbImage};

    #[test]
    fn verifier_uses_the_loaded_grid_settings() {
        let mut config = InspectionConfig::default();
        config.grid_histogram.grid_size = 6;
        config.grid_histogram.correlation_floor = 0.5;
        assert_eq!(verifier_for(&config).config(), &config.grid_histogram);
    }

    #[test]
    fn verify_outcome_ignores_the_primary_count() {
        let mut verification = VerificationReport {
            strategy: "grid_histogram",
            contour_flags: Vec::new(),
            histogram_flags: Vec::new(),
            cleaned_diff: GrayImage::new(4, 4),
            annotated: RgbImage::new(4, 4),
        };
        assert!(!verification_found_defects(&verification));

        verification.contour_flags.push(ContourFlag {
            region: Region::new(0, 0, 2, 2),
            area: 60.0,
            overlap: 4,
        });
        assert!(verification_found_defects(&verification));
    }
}
