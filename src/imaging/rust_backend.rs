//! In-process thumbnail backend.
//!
//! Everything is statically linked into the binary, so this backend works on
//! any machine. It is slower than vips and more CPU bound, which is why the
//! generator pool is narrower when it is the only option.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image::ImageReader` with content sniffing |
//! | Resize | `image::DynamicImage::resize_exact` with `Nearest` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//!
//! HEIC has no decoder here; those thumbnails need vipsthumbnail.

use super::backend::{BackendError, ThumbnailBackend};
use super::calculations::fit_to_height;
use super::params::ThumbnailParams;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::path::Path;

/// Pure Rust backend using the `image` crate.
#[derive(Debug, Default)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Load and decode an image from disk.
///
/// The format is sniffed from the content, so extracted video frames and
/// files with misleading extensions decode the same way.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Encode and save as baseline JPEG.
fn save_jpeg(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality as u8);
    // JPEG has no alpha channel
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))
}

impl ThumbnailBackend for RustBackend {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        let (width, height) = fit_to_height((img.width(), img.height()), params.max_height);
        let resized = if (width, height) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(width, height, FilterType::Nearest)
        };
        save_jpeg(&resized, &params.output, params.quality.value())
    }

    fn decodes(&self, mime_type: &str) -> bool {
        image::ImageFormat::from_mime_type(mime_type).is_some_and(|f| f.reading_enabled())
    }
}
