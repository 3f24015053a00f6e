//! Capture metadata extraction.
//!
//! [`read_capture_metadata`] classifies an image file as either carrying
//! usable capture metadata (timestamp, orientation, optional GPS) or not.
//! Files without usable metadata take the passthrough copy path instead of
//! being watermarked.

mod reader;

pub use reader::{CaptureMetadata, GpsCoords, Orientation, read_capture_metadata};
