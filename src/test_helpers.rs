//! Shared test utilities.
//!
//! Builders for the records that travel between stages, real JPEG files for
//! the stages that read pixels, and a metadata extractor that never touches
//! `exiftool`.

use chrono::{FixedOffset, TimeZone};
use std::path::{Path, PathBuf};

use crate::metadata::datetime::{DateParts, month_day};
use crate::metadata::extractor::{ExtractError, MetadataExtractor};
use crate::metadata::raw::RawMetadata;
use crate::tools::ToolError;
use crate::types::{CandidateFile, Media};

// =========================================================================
// Files on disk
// =========================================================================

/// Write a gradient JPEG, creating parent directories.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save_with_format(path, image::ImageFormat::Jpeg).unwrap();
}

/// Write a flat JPEG whose bytes differ from [`write_jpeg`] and from other
/// shades.
pub fn write_jpeg_shaded(path: &Path, width: u32, height: u32, shade: u8) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, shade / 2, 255 - shade]));
    img.save_with_format(path, image::ImageFormat::Jpeg).unwrap();
}

// =========================================================================
// Records
// =========================================================================

/// A minimal JPEG document captured at noon on `day_of_year` of 2020.
///
/// 2020 is a leap year, so every day of the fixed calendar exists.
pub fn media_at(path: &str, signature: &str, day_of_year: u16) -> Media {
    let (month, day) = month_day(day_of_year);
    let datetime = FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2020, month, day, 12, 0, 0)
        .unwrap();
    let parts = DateParts::of(&datetime);
    Media {
        filename: path.rsplit('\\').next().unwrap_or(path).to_string(),
        path: path.to_string(),
        signature: signature.to_string(),
        lengthinbytes: 1024,
        mimetype: "image/jpeg".to_string(),
        datetime,
        date: parts.date,
        monthname: parts.month_name,
        dayname: parts.day_name,
        dayofyear: parts.day_of_year,
        filemodified: None,
        location: None,
        placename: None,
        cameramake: None,
        cameramodel: None,
        lensinfo: None,
        lensmodel: None,
        aperture: None,
        exposureprogram: None,
        exposuretime: None,
        exposuretimestring: None,
        flash: None,
        fnumber: None,
        focallengthmm: None,
        iso: None,
        whitebalance: None,
        width: None,
        height: None,
        durationseconds: None,
        keywords: Vec::new(),
        warnings: Vec::new(),
    }
}

/// A scanned JPEG candidate with no metadata yet.
pub fn candidate_at(full_path: &str, aliased_path: &str, signature: &str) -> CandidateFile {
    CandidateFile {
        full_path: PathBuf::from(full_path),
        aliased_path: aliased_path.to_string(),
        signature: signature.to_string(),
        length_in_bytes: 0,
        modified: None,
        mime_type: "image/jpeg".to_string(),
        raw_metadata: None,
        warnings: Vec::new(),
    }
}

// =========================================================================
// Extractor
// =========================================================================

/// Extractor returning the same result for every file.
pub struct StaticExtractor {
    raw: Option<RawMetadata>,
}

impl StaticExtractor {
    pub fn returning(raw: RawMetadata) -> Self {
        Self { raw: Some(raw) }
    }

    /// Every extraction fails as if `exiftool` exited non-zero.
    pub fn failing() -> Self {
        Self { raw: None }
    }
}

impl MetadataExtractor for StaticExtractor {
    fn extract(&self, _path: &Path) -> Result<RawMetadata, ExtractError> {
        match &self.raw {
            Some(raw) => Ok(raw.clone()),
            None => Err(ToolError::Failed {
                program: "exiftool".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "File format error".to_string(),
            }
            .into()),
        }
    }
}
