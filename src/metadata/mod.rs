//! Metadata extraction and normalization.
//!
//! Turns a [`CandidateFile`](crate::types::CandidateFile) into the canonical
//! [`Media`](crate::types::Media) document.
//!
//! ## Layers
//!
//! - [`extractor`]: runs the external extractor and returns [`RawMetadata`].
//! - [`raw`]: the extractor's grouped output with loosely typed values.
//! - [`decode`]: per-tag decoding into typed values or warnings.
//! - [`datetime`]: capture-time precedence and derived calendar fields.
//! - [`location`]: GPS coordinates.
//! - [`normalize`]: assembles the document.
//!
//! ## Resolution
//!
//! Where several tags can supply the same field, the first non-empty value
//! wins (see [`resolve`]):
//!
//! - **Capture time**: QuickTime → EXIF → file timestamps
//! - **Camera make/model**: EXIF → QuickTime
//! - **Dimensions**: File → QuickTime
//! - **MIME type**: extractor → scanner guess
//!
//! Nothing that fails to decode aborts a file. The value is dropped and a
//! warning is attached to the document instead.

pub mod datetime;
pub mod decode;
pub mod extractor;
pub mod location;
pub mod normalize;
pub mod raw;

pub use extractor::{ExifToolExtractor, ExtractError, MetadataExtractor};
pub use normalize::Normalizer;
pub use raw::{FieldValue, RawMetadata};

/// Resolve a field from multiple sources.
///
/// Takes a list of optional values in priority order and returns the first
/// non-None, non-empty value.
///
/// ```text
/// capture date: resolve(&[create_date, date_time_original, modify_date])
/// ```
pub fn resolve(sources: &[Option<&str>]) -> Option<String> {
    sources
        .iter()
        .filter_map(|opt| {
            opt.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .next()
}
