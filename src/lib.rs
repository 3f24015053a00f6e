//! # photo-stamp
//!
//! Batch photo watermarker — stamps the capture time and a reverse-geocoded
//! location onto JPEG photos, driven by their EXIF metadata.
//!
//! For every `.jpg` in the working directory the pipeline extracts the
//! capture timestamp, orientation, and GPS position; resolves the position
//! to a province/city/district address; rotates the image upright; and
//! composites a two-line stroke/shadow/fill text block into the bottom-right
//! corner. Files without usable metadata are copied verbatim to a separate
//! folder instead. Files are processed concurrently up to a configured
//! ceiling, each at most once per run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use photo_stamp::config::Config;
//! use photo_stamp::geocode::AmapGeocoder;
//! use photo_stamp::watermark::WatermarkRenderer;
//! use photo_stamp::dispatch;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     dispatch::create_required_directories(&config)?;
//!
//!     let inputs = dispatch::collect_inputs(Path::new("."))?;
//!     let geocoder = Arc::new(AmapGeocoder::new(config.amap_api_key.clone()));
//!     let renderer = Arc::new(WatermarkRenderer::new(
//!         &config.font_path,
//!         config.watermark_settings,
//!     ));
//!
//!     let summary = dispatch::run(inputs, Arc::new(config), geocoder, renderer).await;
//!     println!("{} watermarked, {} copied", summary.watermarked, summary.copied);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`] — configuration types and loading/saving
//! - [`exif`] — capture metadata extraction (timestamp, orientation, GPS)
//! - [`geocode`] — reverse-geocoding service trait and Amap implementation
//! - [`watermark`] — text layout and stroke/shadow/fill compositing
//! - [`dispatch`] — input enumeration and the bounded worker pool

pub mod config;
pub mod dispatch;
pub mod exif;
pub mod geocode;
pub mod watermark;
