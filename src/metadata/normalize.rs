//! Building the canonical [`Media`] document.
//!
//! The normalizer owns the extractor invocation: it runs the extractor on the
//! candidate's file, then folds the raw tags into typed fields. Extraction
//! failure is counted and recorded as a warning; the document is still built
//! from what the scanner knows.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use super::datetime::{DateParts, resolve_capture_time};
use super::decode::{self, Decoded};
use super::extractor::MetadataExtractor;
use super::location::resolve_location;
use super::raw::RawMetadata;
use crate::stats::RunStats;
use crate::types::{CandidateFile, Media};

pub struct Normalizer {
    extractor: Arc<dyn MetadataExtractor>,
    stats: Arc<RunStats>,
}

impl Normalizer {
    pub fn new(extractor: Arc<dyn MetadataExtractor>, stats: Arc<RunStats>) -> Self {
        Self { extractor, stats }
    }

    /// Extract and normalize one candidate.
    pub fn normalize(&self, mut candidate: CandidateFile) -> Media {
        self.stats.extract.invocations.incr();
        match self.extractor.extract(&candidate.full_path) {
            Ok(raw) => candidate.raw_metadata = Some(raw),
            Err(e) => {
                self.stats.extract.failures.incr();
                warn!(path = %candidate.aliased_path, error = %e, "metadata extraction failed");
                candidate.add_warning(format!("Metadata extraction failed: {e}"));
            }
        }
        populate(candidate)
    }
}

/// Keep a decoded value, or record its warning and keep nothing.
fn keep<T>(decoded: Decoded<T>, warnings: &mut Vec<String>) -> Option<T> {
    decoded.unwrap_or_else(|w| {
        warnings.push(w.to_string());
        None
    })
}

/// Fold a candidate and its raw metadata into a document.
pub fn populate(mut candidate: CandidateFile) -> Media {
    let raw = candidate.raw_metadata.take().unwrap_or_default();
    let mut warnings = std::mem::take(&mut candidate.warnings);

    let datetime = resolve_capture_time(&raw, candidate.modified, &mut warnings);
    let parts = DateParts::of(&datetime);
    let location = resolve_location(&raw, &mut warnings);

    let exif = &raw.exif;
    let qt = &raw.quicktime;

    let mimetype = keep(decode::text("MIMEType", raw.file.mime_type.as_ref()), &mut warnings)
        .unwrap_or_else(|| candidate.mime_type.clone());

    let cameramake = first_text(&[("Make", exif.make.as_ref()), ("Make", qt.make.as_ref())], &mut warnings);
    let cameramodel = first_text(&[("Model", exif.model.as_ref()), ("Model", qt.model.as_ref())], &mut warnings);

    let (width, height) = dimensions(&raw, &mut warnings);

    let (exposure, exposure_warning) = decode::exposure_time(exif.exposure_time.as_ref());
    if let Some(w) = exposure_warning {
        warnings.push(w.to_string());
    }

    let mut keywords = BTreeSet::new();
    for (field, value) in [
        ("Keywords", raw.iptc.keywords.as_ref()),
        ("Subject", raw.xmp.subject.as_ref()),
    ] {
        if let Some(w) = decode::collect_keywords(field, value, &mut keywords) {
            warnings.push(w.to_string());
        }
    }

    let filename = candidate
        .full_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Media {
        filename,
        path: candidate.aliased_path,
        signature: candidate.signature,
        lengthinbytes: candidate.length_in_bytes,
        mimetype,
        datetime,
        date: parts.date,
        monthname: parts.month_name,
        dayname: parts.day_name,
        dayofyear: parts.day_of_year,
        filemodified: candidate.modified,
        location,
        placename: None,
        cameramake,
        cameramodel,
        lensinfo: keep(decode::text("LensInfo", exif.lens_info.as_ref()), &mut warnings),
        lensmodel: keep(decode::text("LensModel", exif.lens_model.as_ref()), &mut warnings),
        aperture: keep(decode::number("ApertureValue", exif.aperture_value.as_ref()), &mut warnings),
        exposureprogram: keep(
            decode::text("ExposureProgram", exif.exposure_program.as_ref()),
            &mut warnings,
        ),
        exposuretime: exposure.as_ref().and_then(|e| e.seconds),
        exposuretimestring: exposure.map(|e| e.display),
        flash: keep(decode::text("Flash", exif.flash.as_ref()), &mut warnings),
        fnumber: keep(decode::number("FNumber", exif.f_number.as_ref()), &mut warnings),
        focallengthmm: keep(decode::focal_length_mm(exif.focal_length.as_ref()), &mut warnings),
        iso: keep(decode::iso(exif.iso.as_ref()), &mut warnings),
        whitebalance: keep(decode::text("WhiteBalance", exif.white_balance.as_ref()), &mut warnings),
        width,
        height,
        durationseconds: keep(decode::duration_seconds(qt.duration.as_ref()), &mut warnings),
        keywords: keywords.into_iter().collect(),
        warnings,
    }
}

fn first_text(
    sources: &[(&str, Option<&super::raw::FieldValue>)],
    warnings: &mut Vec<String>,
) -> Option<String> {
    sources
        .iter()
        .find_map(|(field, value)| keep(decode::text(field, *value), warnings))
}

/// File-level dimensions first, then the QuickTime track's.
fn dimensions(raw: &RawMetadata, warnings: &mut Vec<String>) -> (Option<u32>, Option<u32>) {
    let file_width = keep(decode::dimension("ImageWidth", raw.file.image_width.as_ref()), warnings);
    let file_height = keep(decode::dimension("ImageHeight", raw.file.image_height.as_ref()), warnings);
    if file_width.is_some() && file_height.is_some() {
        return (file_width, file_height);
    }
    let qt_width = keep(decode::dimension("ImageWidth", raw.quicktime.image_width.as_ref()), warnings);
    let qt_height = keep(decode::dimension("ImageHeight", raw.quicktime.image_height.as_ref()), warnings);
    if qt_width.is_some() && qt_height.is_some() {
        (qt_width, qt_height)
    } else {
        (file_width.or(qt_width), file_height.or(qt_height))
    }
}
