//! Input enumeration and the bounded-concurrency worker pool.
//!
//! One worker task runs per input file, admitted through a fixed-capacity
//! semaphore. A shared claim set guarantees at-most-once processing per
//! filename within the run; worker failures are logged and isolated.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use walkdir::WalkDir;

use crate::config::Config;
use crate::exif::{self, CaptureMetadata};
use crate::geocode::ReverseGeocoder;
use crate::watermark::WatermarkRenderer;

/// The single input container this pipeline processes.
const INPUT_EXTENSION: &str = "jpg";

/// Shared per-run state: the dedup guard and the admission gate.
///
/// Both are touched only for the duration of a check-and-claim or an
/// acquire; neither lock is ever held across blocking I/O.
pub struct RunContext {
    claimed: Mutex<HashSet<String>>,
    gate: Arc<Semaphore>,
}

impl RunContext {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            claimed: Mutex::new(HashSet::new()),
            gate: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Atomically claim a filename for this run.
    ///
    /// Returns `false` when the name was already claimed; the caller must
    /// then treat the submission as a no-op.
    pub fn try_claim(&self, name: &str) -> bool {
        self.claimed.lock().unwrap().insert(name.to_string())
    }

    /// The admission gate bounding simultaneously in-flight workers.
    pub fn gate(&self) -> Arc<Semaphore> {
        Arc::clone(&self.gate)
    }
}

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Watermarked and written under a timestamp-derived name.
    Watermarked(PathBuf),
    /// No usable metadata; copied verbatim to the no-metadata folder.
    Copied(PathBuf),
    /// The filename was already claimed this run; nothing was done.
    Duplicate,
}

/// End-of-run tally, written to the log by the caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub watermarked: usize,
    pub copied: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Enumerate candidate input files in `dir`, non-recursively.
///
/// The returned set is fixed for the run — there is no re-scan. Failure to
/// enumerate is a startup error, not a per-task one.
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.context("Failed to enumerate input files")?;
        if entry.file_type().is_file() && has_input_extension(entry.path()) {
            inputs.push(entry.path().to_path_buf());
        }
    }
    inputs.sort();
    Ok(inputs)
}

fn has_input_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(INPUT_EXTENSION))
        .unwrap_or(false)
}

/// Create the output and no-metadata folders ahead of the run.
pub fn create_required_directories(config: &Config) -> Result<()> {
    for dir in [&config.output_folder, &config.no_exif_folder] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {dir}"))?;
        log::info!("Directory {dir} ready");
    }
    Ok(())
}

/// Drive the full batch: one bounded worker per input file.
///
/// The run returns only after every spawned worker has been joined, i.e.
/// after every enumerated file reached an outcome or failed.
pub async fn run(
    inputs: Vec<PathBuf>,
    config: Arc<Config>,
    geocoder: Arc<dyn ReverseGeocoder>,
    renderer: Arc<WatermarkRenderer>,
) -> RunSummary {
    let ctx = Arc::new(RunContext::new(config.max_concurrency));
    let mut workers = Vec::with_capacity(inputs.len());

    for path in inputs {
        // The slot is taken before the worker exists and travels with it;
        // dropping the permit on any exit path releases the slot.
        let permit = ctx
            .gate()
            .acquire_owned()
            .await
            .expect("admission gate never closes during a run");

        let ctx = Arc::clone(&ctx);
        let config = Arc::clone(&config);
        let geocoder = Arc::clone(&geocoder);
        let renderer = Arc::clone(&renderer);

        workers.push(tokio::spawn(async move {
            let _permit = permit;
            match process_file(&path, &ctx, &config, geocoder, &renderer).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    log::error!("Failed to process {}: {e:#}", path.display());
                    None
                }
            }
        }));
    }

    let mut summary = RunSummary::default();
    for worker in workers {
        match worker.await {
            Ok(Some(TaskOutcome::Watermarked(_))) => summary.watermarked += 1,
            Ok(Some(TaskOutcome::Copied(_))) => summary.copied += 1,
            Ok(Some(TaskOutcome::Duplicate)) => summary.duplicates += 1,
            Ok(None) => summary.failed += 1,
            Err(e) => {
                log::error!("Worker panicked: {e}");
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Run one file through claim → extract → resolve → compose → write.
pub async fn process_file(
    path: &Path,
    ctx: &RunContext,
    config: &Config,
    geocoder: Arc<dyn ReverseGeocoder>,
    renderer: &WatermarkRenderer,
) -> Result<TaskOutcome> {
    let name = file_name(path)?;

    if !ctx.try_claim(&name) {
        log::debug!("{name} already claimed, skipping");
        return Ok(TaskOutcome::Duplicate);
    }

    let Some(meta) = exif::read_capture_metadata(path) else {
        return copy_to_no_exif(path, &name, config).await;
    };

    // Geocoding runs as its own task; the worker blocks on the single
    // result. A panicking resolver degrades to an empty address instead of
    // taking the worker down.
    let resolver = tokio::spawn({
        let gps = meta.gps;
        async move {
            match gps {
                Some(coords) => geocoder.resolve(coords, None).await,
                None => String::new(),
            }
        }
    });
    let address = match resolver.await {
        Ok(address) => address,
        Err(e) => {
            log::warn!("Geocoding task failed for {name}: {e}");
            String::new()
        }
    };

    write_watermarked(path, &meta, &address, config, renderer)
}

/// Copy a file with no usable metadata, byte for byte, under its own name.
async fn copy_to_no_exif(path: &Path, name: &str, config: &Config) -> Result<TaskOutcome> {
    let target = Path::new(&config.no_exif_folder).join(name);
    tokio::fs::copy(path, &target).await.with_context(|| {
        format!(
            "Failed to copy {} to {}",
            path.display(),
            target.display()
        )
    })?;
    log::info!(
        "Copied {} -> {} (no usable metadata)",
        path.display(),
        target.display()
    );
    Ok(TaskOutcome::Copied(target))
}

/// Decode, upright, watermark, and encode one image.
fn write_watermarked(
    path: &Path,
    meta: &CaptureMetadata,
    address: &str,
    config: &Config,
    renderer: &WatermarkRenderer,
) -> Result<TaskOutcome> {
    log::info!("Watermarking {}", path.display());

    let img = image::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?;
    // Upright first — the text block is laid out on the corrected frame.
    let img = meta.orientation.apply(img);

    let timestamp_line = meta.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
    let stamped = renderer.render(&img, &timestamp_line, address);

    let output_path = Path::new(&config.output_folder).join(output_name(meta));
    let file = std::fs::File::create(&output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut writer = std::io::BufWriter::new(file);

    // JPEG carries no alpha; flatten the composited buffer before encoding.
    let rgb = image::DynamicImage::ImageRgba8(stamped).to_rgb8();
    JpegEncoder::new_with_quality(&mut writer, config.jpeg_quality)
        .encode_image(&rgb)
        .with_context(|| format!("Failed to encode {}", output_path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", output_path.display()))?;

    Ok(TaskOutcome::Watermarked(output_path))
}

/// Output files are named by capture time: `YYYYMMDDHHMMSS.jpg`.
fn output_name(meta: &CaptureMetadata) -> String {
    format!("{}.jpg", meta.timestamp.format("%Y%m%d%H%M%S"))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
        .with_context(|| format!("Input path {} has no usable file name", path.display()))
}
