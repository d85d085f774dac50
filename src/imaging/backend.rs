//! Thumbnail backend trait and shared types.
//!
//! The [`ThumbnailBackend`] trait is the one operation every backend must
//! support: write a height-capped JPEG thumbnail of an image. Two production
//! implementations exist:
//!
//! - [`VipsBackend`](super::vips_backend::VipsBackend) shells out to
//!   `vipsthumbnail`. Fast, and used whenever the tool is installed.
//! - [`RustBackend`](super::rust_backend::RustBackend) decodes and resizes in
//!   process with the `image` crate. Always available, and also the resize
//!   path for frames pulled out of videos.
//!
//! The choice is made once at startup by probing for `vipsthumbnail`.

use super::params::ThumbnailParams;
use crate::tools::ToolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Trait for thumbnail backends.
pub trait ThumbnailBackend: Send + Sync {
    /// Short name for logs (`"vips"`, `"rust"`).
    fn name(&self) -> &'static str;

    /// Write the thumbnail described by `params`. The output directory exists.
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError>;

    /// Whether this backend can decode images of `mime_type`.
    fn decodes(&self, _mime_type: &str) -> bool {
        true
    }
}
