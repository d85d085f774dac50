//! Records that travel between pipeline stages.
//!
//! A [`CandidateFile`] is produced by the scanner and owned by exactly one
//! stage at a time; it becomes a [`Media`] document in the normalizer, and the
//! document is handed downstream until the commit stage writes it to the
//! document store. Nothing here is shared: ownership moves with the queue.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::metadata::RawMetadata;

/// A file discovered by the scanner that has not been normalized yet.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub full_path: PathBuf,
    /// `alias\relative\path` form, portable across machines.
    pub aliased_path: String,
    /// SHA-256 of the file contents, hex encoded.
    pub signature: String,
    pub length_in_bytes: u64,
    /// Filesystem modification time, if the platform reports one.
    pub modified: Option<DateTime<FixedOffset>>,
    /// MIME type guessed by the scanner (extension or content sniffing).
    pub mime_type: String,
    /// Filled in by the normalizer from the metadata extractor.
    pub raw_metadata: Option<RawMetadata>,
    pub warnings: Vec<String>,
}

impl CandidateFile {
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// A validated latitude/longitude pair. Never stored partially.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
}

/// The canonical search document.
///
/// Field names serialize lowercase to match the search index mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct Media {
    pub filename: String,
    pub path: String,
    pub signature: String,
    pub lengthinbytes: u64,
    pub mimetype: String,

    pub datetime: DateTime<FixedOffset>,
    /// `YYYYMMDD`
    pub date: String,
    /// e.g. `"January Jan"`
    pub monthname: String,
    /// e.g. `"Monday Mon"`
    pub dayname: String,
    pub dayofyear: u16,
    /// Filesystem modification time seen when the document was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filemodified: Option<DateTime<FixedOffset>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cameramake: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cameramodel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lensinfo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lensmodel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposureprogram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposuretime: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposuretimestring: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fnumber: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focallengthmm: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitebalance: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durationseconds: Option<f32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Media {
    /// Top-level MIME type (`image`, `video`), lowercased.
    pub fn media_kind(&self) -> String {
        top_level_type(&self.mimetype)
    }
}

pub(crate) fn top_level_type(mime_type: &str) -> String {
    mime_type
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Outcome of comparing a candidate against this run and the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// No document exists for the path.
    New,
    /// A document exists for the path but its content differs.
    Changed,
    /// The stored document is current; the candidate is skipped.
    Unchanged,
    /// Another candidate with the same content was already seen this run.
    Duplicate,
}

impl Change {
    /// Whether the candidate continues through normalization and commit.
    pub fn needs_indexing(self) -> bool {
        matches!(self, Change::New | Change::Changed)
    }
}

/// A normalized document on its way to the commit stage.
#[derive(Debug, Clone)]
pub struct PendingDocument {
    pub media: Media,
    pub change: Change,
}

/// What the thumbnail stages need to know about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub full_path: PathBuf,
    pub aliased_path: String,
    pub mime_type: String,
    pub signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_type_is_lowercased() {
        assert_eq!(top_level_type("Image/JPEG"), "image");
        assert_eq!(top_level_type("video/quicktime"), "video");
        assert_eq!(top_level_type(""), "");
    }

    #[test]
    fn only_new_and_changed_are_indexed() {
        assert!(Change::New.needs_indexing());
        assert!(Change::Changed.needs_indexing());
        assert!(!Change::Unchanged.needs_indexing());
        assert!(!Change::Duplicate.needs_indexing());
    }

    #[test]
    fn geopoint_serializes_as_lat_lon() {
        let point = GeoPoint {
            latitude: 47.5,
            longitude: -122.25,
        };
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, r#"{"lat":47.5,"lon":-122.25}"#);
    }
}
