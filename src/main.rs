use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use photo_stamp::config::Config;
use photo_stamp::dispatch;
use photo_stamp::geocode::AmapGeocoder;
use photo_stamp::watermark::WatermarkRenderer;

const LOG_FILE: &str = "process.log";

#[derive(Parser, Debug)]
#[command(
    name = "photo-stamp",
    version,
    about = "Batch photo watermarker — stamp capture time and resolved location onto JPEG photos"
)]
struct Cli {
    /// Path to config file (default: config.json in the working directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Directory to scan for .jpg inputs (default: the working directory)
    #[arg(long, value_name = "DIR", default_value = ".")]
    input_dir: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle --init
    if cli.init {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = path.map(Path::to_path_buf).unwrap_or_else(Config::config_path);
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    // The log file is the run's only diagnostic channel; failing to open it
    // is fatal before any file is touched.
    init_logger(cli.verbose).context("Failed to initialize log file")?;
    log::info!("Log initialized");

    println!("Processing photos; check {LOG_FILE} if anything looks wrong");

    // Load config — and leave a fresh default behind when there is none yet,
    // so the next run has something to edit.
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    if cli.config.is_none() && !config_path.exists() {
        Config::default().save(Some(&config_path))?;
        anyhow::bail!(
            "No config file found; a default has been written to {}. Edit it and re-run.",
            config_path.display()
        );
    }
    let config = Config::load(Some(&config_path))?;

    dispatch::create_required_directories(&config)?;

    let inputs = dispatch::collect_inputs(&cli.input_dir)?;
    println!("Found {} jpg file(s)", inputs.len());
    log::info!("Found {} input file(s) in {}", inputs.len(), cli.input_dir.display());

    let geocoder = Arc::new(AmapGeocoder::new(config.amap_api_key.clone()));
    let renderer = Arc::new(WatermarkRenderer::new(
        &config.font_path,
        config.watermark_settings,
    ));
    if !renderer.has_font() {
        log::warn!("No usable watermark font; images will be written unwatermarked");
    }

    let summary = dispatch::run(inputs, Arc::new(config), geocoder, renderer).await;

    log::info!(
        "All files processed: {} watermarked, {} copied, {} duplicate(s), {} failed",
        summary.watermarked,
        summary.copied,
        summary.duplicates,
        summary.failed
    );
    println!("Done");

    Ok(())
}

/// Route all log records to an append-only file in the working directory.
fn init_logger(verbose: bool) -> Result<()> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)
        .with_context(|| format!("Failed to open {LOG_FILE}"))?;

    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    Ok(())
}
