use chrono::NaiveDateTime;
use image::DynamicImage;
use nom_exif::*;
use std::path::Path;

/// Capture metadata extracted from an image file.
///
/// Only produced when the file carries a valid capture timestamp; a file
/// whose metadata decodes but has no timestamp is treated the same as a
/// file with no metadata at all, and its orientation/GPS are discarded
/// with it.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureMetadata {
    /// Capture time, second precision, no timezone beyond the source.
    pub timestamp: NaiveDateTime,
    /// Rotation needed to bring the pixels upright.
    pub orientation: Orientation,
    /// Embedded GPS position, if present and decodable.
    pub gps: Option<GpsCoords>,
}

/// A GPS position in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsCoords {
    pub latitude: f64,
    pub longitude: f64,
}

/// Rotation derived from the EXIF orientation code.
///
/// The table is: 3 → 180°, 6 → 270°, 8 → 90°, everything else → identity.
/// 6/270 and 8/90 are intentionally swapped relative to the usual EXIF
/// convention and must stay that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Normal,
    Rotate180,
    Rotate270,
    Rotate90,
}

impl Orientation {
    /// Map a raw EXIF orientation code to a rotation.
    pub fn from_code(code: u32) -> Self {
        match code {
            3 => Self::Rotate180,
            6 => Self::Rotate270,
            8 => Self::Rotate90,
            _ => Self::Normal,
        }
    }

    /// Apply the rotation to a decoded image.
    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => img,
            Self::Rotate180 => img.rotate180(),
            Self::Rotate270 => img.rotate270(),
            Self::Rotate90 => img.rotate90(),
        }
    }
}

/// Read capture metadata from an image file.
///
/// Returns `None` when the file cannot be opened, carries no parseable
/// metadata block, or has no valid capture timestamp — all of which route
/// the file to the passthrough copy path. GPS decode failures are logged
/// and reported as `gps: None` without discarding the rest.
pub fn read_capture_metadata(path: &Path) -> Option<CaptureMetadata> {
    let mut parser = MediaParser::new();
    let ms = match MediaSource::file_path(path) {
        Ok(ms) => ms,
        Err(e) => {
            log::debug!("Cannot read {} for metadata: {e}", path.display());
            return None;
        }
    };

    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(e) => {
            log::debug!("No metadata block in {}: {e}", path.display());
            return None;
        }
    };

    // GPS parses from the iterator before it is consumed into Exif
    let gps = match iter.parse_gps_info() {
        Ok(info) => info.map(|gps| GpsCoords {
            latitude: latlng_to_decimal(&gps.latitude, gps.latitude_ref),
            longitude: latlng_to_decimal(&gps.longitude, gps.longitude_ref),
        }),
        Err(e) => {
            log::warn!("Failed to read GPS data from {}: {e}", path.display());
            None
        }
    };
    let exif: Exif = iter.into();

    let timestamp = [
        ExifTag::DateTimeOriginal,
        ExifTag::CreateDate,
        ExifTag::ModifyDate,
    ]
    .iter()
    .find_map(|tag| {
        exif.get(*tag)
            .and_then(entry_to_string)
            .and_then(|s| parse_capture_time(&s))
    });

    let Some(timestamp) = timestamp else {
        log::debug!("No capture timestamp in {}", path.display());
        return None;
    };

    let orientation = exif
        .get(ExifTag::Orientation)
        .and_then(entry_to_string)
        .and_then(|s| s.parse::<u32>().ok())
        .map(Orientation::from_code)
        .unwrap_or(Orientation::Normal);

    Some(CaptureMetadata {
        timestamp,
        orientation,
        gps,
    })
}

/// Convert an EntryValue to a trimmed Option<String>.
fn entry_to_string(val: &EntryValue) -> Option<String> {
    let s = val.to_string();
    let s = s.trim().trim_matches('"').to_string();
    if s.is_empty() { None } else { Some(s) }
}

/// Parse a capture timestamp, tolerating the formats EXIF writers emit.
///
/// Zero dates (`0000:00:00 00:00:00`) fail every format and count as absent.
fn parse_capture_time(s: &str) -> Option<NaiveDateTime> {
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S") {
        return Some(t);
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(t);
    }
    // Offset-carrying values round-trip through Display as "... +08:00"
    if let Ok(t) = chrono::DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Some(t.naive_local());
    }
    if let Ok(t) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(t.naive_local());
    }
    None
}

/// Convert a nom-exif LatLng (3 URationals: deg, min, sec) to decimal degrees.
fn latlng_to_decimal(latlng: &LatLng, reference: char) -> f64 {
    let degrees = latlng.0.0 as f64 / latlng.0.1 as f64;
    let minutes = latlng.1.0 as f64 / latlng.1.1 as f64;
    let seconds = latlng.2.0 as f64 / latlng.2.1 as f64;

    let mut coord = degrees + minutes / 60.0 + seconds / 3600.0;

    if reference == 'S' || reference == 'W' {
        coord = -coord;
    }

    coord
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::fs;
    use tempfile::TempDir;

    // ── parse_capture_time ───────────────────────────────────────────

    #[test]
    fn parses_exif_colon_format() {
        let t = parse_capture_time("2023:05:01 10:00:00").unwrap();
        assert_eq!(t.format("%Y-%m-%d %H:%M:%S").to_string(), "2023-05-01 10:00:00");
    }

    #[test]
    fn parses_dashed_format() {
        assert!(parse_capture_time("2023-05-01 10:00:00").is_some());
    }

    #[test]
    fn parses_offset_format() {
        let t = parse_capture_time("2023-05-01 10:00:00 +08:00").unwrap();
        assert_eq!(t.format("%H:%M:%S").to_string(), "10:00:00");
    }

    #[test]
    fn parses_rfc3339() {
        let t = parse_capture_time("2023-05-01T10:00:00+08:00").unwrap();
        assert_eq!(t.format("%H:%M:%S").to_string(), "10:00:00");
    }

    #[test]
    fn zero_date_is_absent() {
        assert!(parse_capture_time("0000:00:00 00:00:00").is_none());
    }

    #[test]
    fn garbage_is_absent() {
        assert!(parse_capture_time("").is_none());
        assert!(parse_capture_time("last tuesday").is_none());
    }

    // ── Orientation::from_code ───────────────────────────────────────

    #[test]
    fn orientation_code_table() {
        assert_eq!(Orientation::from_code(3), Orientation::Rotate180);
        assert_eq!(Orientation::from_code(6), Orientation::Rotate270);
        assert_eq!(Orientation::from_code(8), Orientation::Rotate90);
    }

    #[test]
    fn unrecognized_codes_are_identity() {
        for code in [0, 1, 2, 4, 5, 7, 9, 255] {
            assert_eq!(Orientation::from_code(code), Orientation::Normal, "code {code}");
        }
    }

    // ── Orientation::apply ───────────────────────────────────────────

    #[test]
    fn rotate90_swaps_dimensions() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(4, 2));
        let rotated = Orientation::Rotate90.apply(img);
        assert_eq!((rotated.width(), rotated.height()), (2, 4));
    }

    #[test]
    fn rotate180_keeps_dimensions() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(4, 2));
        let rotated = Orientation::Rotate180.apply(img);
        assert_eq!((rotated.width(), rotated.height()), (4, 2));
    }

    #[test]
    fn rotate90_moves_marked_pixel() {
        let mut buf = RgbaImage::new(3, 2);
        buf.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        let rotated = Orientation::Rotate90.apply(DynamicImage::ImageRgba8(buf)).to_rgba8();
        // clockwise: (x, y) -> (h - 1 - y, x)
        assert_eq!(rotated.get_pixel(1, 0), &image::Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn identity_leaves_pixels_alone() {
        let mut buf = RgbaImage::new(2, 2);
        buf.put_pixel(1, 1, image::Rgba([9, 9, 9, 255]));
        let out = Orientation::Normal.apply(DynamicImage::ImageRgba8(buf.clone()));
        assert_eq!(out.to_rgba8(), buf);
    }

    // ── latlng_to_decimal ────────────────────────────────────────────

    #[test]
    fn north_east_positive() {
        let lat = LatLng(
            URational::from((31, 1)),
            URational::from((13, 1)),
            URational::from((48, 1)),
        );
        let v = latlng_to_decimal(&lat, 'N');
        assert!((v - 31.23).abs() < 1e-6);
    }

    #[test]
    fn south_west_negative() {
        let lat = LatLng(
            URational::from((31, 1)),
            URational::from((13, 1)),
            URational::from((48, 1)),
        );
        assert!(latlng_to_decimal(&lat, 'S') < 0.0);
        assert!(latlng_to_decimal(&lat, 'W') < 0.0);
    }

    // ── read_capture_metadata ────────────────────────────────────────

    #[test]
    fn unreadable_file_is_no_metadata() {
        let dir = TempDir::new().unwrap();
        assert!(read_capture_metadata(&dir.path().join("missing.jpg")).is_none());
    }

    #[test]
    fn garbage_file_is_no_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();
        assert!(read_capture_metadata(&path).is_none());
    }
}
