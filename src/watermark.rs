//! Watermark compositing — stroke, shadow, and fill text passes.

use ab_glyph::{Font, FontVec, PxScale};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{Blend, draw_text_mut};

use crate::config::{WatermarkColor, WatermarkSettings};

/// Stroke outline offsets around the anchor, excluding (0,0).
const STROKE_OFFSETS: [(i32, i32); 8] = [
    (-2, -2),
    (-2, 0),
    (-2, 2),
    (0, -2),
    (0, 2),
    (2, -2),
    (2, 0),
    (2, 2),
];

/// Drop-shadow offsets, drawn after the stroke and before the fill.
const SHADOW_OFFSETS: [(i32, i32); 3] = [(4, 4), (3, 3), (5, 5)];

const STROKE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const SHADOW_COLOR: Rgba<u8> = Rgba([0, 0, 0, 180]);

const LINE_HEIGHT_FACTOR: f32 = 1.2;

// Width-per-character factors of the block estimate. The timestamp line is
// all ASCII digits and punctuation, the address line mostly CJK. Neither
// factor is a real glyph metric; the estimate only places the block anchor.
const TIMESTAMP_WIDTH_FACTOR: f32 = 0.5;
const ADDRESS_WIDTH_FACTOR: f32 = 0.33;

/// Renders the two-line timestamp/address watermark onto images.
///
/// The font is loaded once at construction. A renderer whose font failed to
/// load or parse still works: [`render`](Self::render) then returns the
/// source converted to RGBA, unwatermarked, and the failure is logged.
pub struct WatermarkRenderer {
    font: Option<FontVec>,
    settings: WatermarkSettings,
}

impl WatermarkRenderer {
    pub fn new(font_path: &str, settings: WatermarkSettings) -> Self {
        Self {
            font: load_font(font_path),
            settings,
        }
    }

    /// Whether a usable font was loaded at construction.
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Composite the watermark onto an (already upright) image.
    ///
    /// Line 1 is the formatted capture timestamp, line 2 the resolved
    /// address (possibly empty). Pixels outside the text block are left
    /// untouched; the returned buffer is fully opaque for JPEG sources.
    pub fn render(
        &self,
        img: &DynamicImage,
        timestamp_line: &str,
        address_line: &str,
    ) -> RgbaImage {
        let rgba = img.to_rgba8();

        let Some(font) = &self.font else {
            return rgba;
        };

        let layout = TextLayout::compute(
            rgba.width(),
            rgba.height(),
            timestamp_line,
            address_line,
            &self.settings,
        );
        let lines = [timestamp_line, address_line];

        report_missing_glyphs(font, &lines);

        let mut canvas = Blend(rgba);

        draw_pass(&mut canvas, font, &layout, &lines, &STROKE_OFFSETS, STROKE_COLOR);
        draw_pass(&mut canvas, font, &layout, &lines, &SHADOW_OFFSETS, SHADOW_COLOR);
        draw_pass(&mut canvas, font, &layout, &lines, &[(0, 0)], fill_color(self.settings.color));

        canvas.0
    }
}

/// Per-image placement of the two-line text block, anchored bottom-right.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TextLayout {
    font_size: f32,
    x: i32,
    y: i32,
    line_height: i32,
}

impl TextLayout {
    fn compute(
        width: u32,
        height: u32,
        timestamp_line: &str,
        address_line: &str,
        settings: &WatermarkSettings,
    ) -> Self {
        let longer_side = width.max(height) as f32;
        let font_size = longer_side * settings.font_size;

        let width_pad = (width as f32 * settings.width_padding) as i32;
        let height_pad = (height as f32 * settings.height_padding) as i32;
        let line_height = (font_size * LINE_HEIGHT_FACTOR) as i32;

        // Character-count estimate of the block width, taking the wider of
        // the two lines.
        let timestamp_width = timestamp_line.chars().count() as f32 * TIMESTAMP_WIDTH_FACTOR;
        let address_width = address_line.chars().count() as f32 * ADDRESS_WIDTH_FACTOR;
        let block_width = (font_size * timestamp_width.max(address_width)) as i32;

        let x = width as i32 - block_width - width_pad;
        let y = height as i32 - line_height * 2 - height_pad;

        Self {
            font_size,
            x,
            y,
            line_height,
        }
    }
}

/// Draw every line at every offset of one layer before the next layer runs,
/// so later layers are never occluded by earlier ones.
fn draw_pass(
    canvas: &mut Blend<RgbaImage>,
    font: &FontVec,
    layout: &TextLayout,
    lines: &[&str],
    offsets: &[(i32, i32)],
    color: Rgba<u8>,
) {
    let scale = PxScale::from(layout.font_size);
    for (i, line) in lines.iter().enumerate() {
        let base_y = layout.y + layout.line_height * i as i32;
        for &(dx, dy) in offsets {
            draw_text_mut(canvas, color, layout.x + dx, base_y + dy, scale, font, line);
        }
    }
}

/// One aggregated warning per render for characters the font cannot draw,
/// instead of a log line per glyph and offset. Missing glyphs never abort
/// the remaining draws.
fn report_missing_glyphs(font: &FontVec, lines: &[&str]) {
    let missing = lines
        .iter()
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_whitespace() && font.glyph_id(*c).0 == 0)
        .count();
    if missing > 0 {
        log::warn!("Watermark font has no glyph for {missing} character(s); they render blank");
    }
}

fn fill_color(color: WatermarkColor) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, color.a])
}

fn load_font(path: &str) -> Option<FontVec> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Failed to load font file {path}: {e}");
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            log::warn!("Failed to parse font {path}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatermarkColor;
    use std::fs;
    use tempfile::TempDir;

    fn settings() -> WatermarkSettings {
        WatermarkSettings {
            font_size: 0.02,
            width_padding: 0.02,
            height_padding: 0.01,
            color: WatermarkColor {
                r: 255,
                g: 165,
                b: 0,
                a: 255,
            },
        }
    }

    // ── TextLayout::compute ──────────────────────────────────────────

    #[test]
    fn landscape_layout() {
        let layout =
            TextLayout::compute(1920, 1080, "2023-05-01 10:00:00", "上海市黄浦区", &settings());

        // font 1920 * 0.02 = 38.4, line height 46
        assert!((layout.font_size - 38.4).abs() < 1e-3);
        assert_eq!(layout.line_height, 46);
        // timestamp: 19 chars * 0.5 = 9.5 beats address: 6 chars * 0.33
        // block = 38.4 * 9.5 = 364; x = 1920 - 364 - 38
        assert_eq!(layout.x, 1518);
        // y = 1080 - 2*46 - 10
        assert_eq!(layout.y, 978);
    }

    #[test]
    fn portrait_uses_longer_side_for_font() {
        let layout = TextLayout::compute(1080, 1920, "t", "", &settings());
        assert!((layout.font_size - 38.4).abs() < 1e-3);
    }

    #[test]
    fn empty_address_sizes_block_from_timestamp() {
        let with = TextLayout::compute(1000, 1000, "2023-05-01 10:00:00", "", &settings());
        let without =
            TextLayout::compute(1000, 1000, "2023-05-01 10:00:00", "短地址", &settings());
        assert_eq!(with.x, without.x);
    }

    #[test]
    fn long_address_widens_block() {
        let short = TextLayout::compute(1000, 1000, "t", "xy", &settings());
        let long = TextLayout::compute(
            1000,
            1000,
            "t",
            "一条非常非常非常非常非常长的地址字符串",
            &settings(),
        );
        assert!(long.x < short.x);
    }

    // ── render without a font ────────────────────────────────────────

    fn renderer_without_font() -> WatermarkRenderer {
        WatermarkRenderer::new("/definitely/not/a/font.ttf", settings())
    }

    #[test]
    fn missing_font_degrades_to_fontless() {
        assert!(!renderer_without_font().has_font());
    }

    #[test]
    fn unparsable_font_degrades_to_fontless() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.ttf");
        fs::write(&path, b"not a font").unwrap();
        let renderer = WatermarkRenderer::new(path.to_str().unwrap(), settings());
        assert!(!renderer.has_font());
    }

    #[test]
    fn fontless_render_is_pixel_identical() {
        let mut buf = RgbaImage::new(8, 6);
        buf.put_pixel(3, 2, Rgba([10, 20, 30, 255]));
        let img = DynamicImage::ImageRgba8(buf.clone());

        let out = renderer_without_font().render(&img, "2023-05-01 10:00:00", "somewhere");
        assert_eq!(out, buf);
    }

    #[test]
    fn fontless_render_is_opaque_for_rgb_sources() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
        let out = renderer_without_font().render(&img, "t", "");
        assert!(out.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn render_preserves_dimensions() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(31, 17));
        let out = renderer_without_font().render(&img, "t", "a");
        assert_eq!((out.width(), out.height()), (31, 17));
    }
}
