use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the photo-stamp pipeline.
///
/// Controls where processed images are written, JPEG encoding quality,
/// the reverse-geocoding credential, worker concurrency, and watermark
/// appearance. The on-disk format is camelCase JSON:
///
/// ```json
/// {
///     "outputFolder": "processed",
///     "noExifFolder": "no_exif",
///     "jpegQuality": 70,
///     "amapAPIKey": "",
///     "maxConcurrency": 5,
///     "fontPath": "",
///     "watermarkSettings": {
///         "fontSize": 0.02,
///         "widthPadding": 0.02,
///         "heightPadding": 0.01,
///         "color": { "r": 255, "g": 165, "b": 0, "a": 255 }
///     }
/// }
/// ```
///
/// # Loading
///
/// ```rust,no_run
/// use photo_stamp::config::Config;
///
/// // From a JSON file — a missing or unparsable file is an error
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Folder for watermarked output images, relative to the working directory.
    pub output_folder: String,
    /// Folder for inputs with no usable metadata (copied verbatim).
    pub no_exif_folder: String,
    /// JPEG encode quality, 1..=100.
    pub jpeg_quality: u8,
    /// Amap reverse-geocoding API key; empty disables geocoding entirely.
    #[serde(rename = "amapAPIKey")]
    pub amap_api_key: String,
    /// Maximum number of files processed at once.
    pub max_concurrency: usize,
    /// Path to a TTF/TTC font used for the watermark text.
    pub font_path: String,
    /// Watermark layout fractions and fill color.
    pub watermark_settings: WatermarkSettings,
}

/// Watermark appearance, expressed as fractions of the image dimensions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkSettings {
    /// Font size as a fraction of the longer image side.
    pub font_size: f32,
    /// Horizontal inset as a fraction of the image width.
    pub width_padding: f32,
    /// Vertical inset as a fraction of the image height.
    pub height_padding: f32,
    /// Fill color of the text itself; stroke and shadow are always black.
    pub color: WatermarkColor,
}

/// RGBA fill color for the watermark text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WatermarkColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_folder: "processed".to_string(),
            no_exif_folder: "no_exif".to_string(),
            jpeg_quality: 70,
            amap_api_key: String::new(),
            max_concurrency: 5,
            font_path: String::new(),
            watermark_settings: WatermarkSettings {
                font_size: 0.02,
                width_padding: 0.02,
                height_padding: 0.01,
                color: WatermarkColor {
                    r: 255,
                    g: 165,
                    b: 0,
                    a: 255,
                },
            },
        }
    }
}

impl Config {
    /// Resolve the default config file path — `config.json` in the working directory.
    pub fn config_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// Load config from the given path, or from the default location.
    ///
    /// Unlike most per-task failures, a missing or unreadable config is a
    /// startup error: the pipeline must never run with guessed settings.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path(),
        };

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path(),
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            anyhow::bail!("maxConcurrency must be at least 1");
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            anyhow::bail!("jpegQuality must be in 1..=100");
        }
        Ok(())
    }
}
