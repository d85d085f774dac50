//! Thumbnail generation.
//!
//! | Input | Path |
//! |---|---|
//! | **Image**, vips installed | `vipsthumbnail` subprocess |
//! | **Image**, no vips | `image` crate decode + nearest-neighbor resize |
//! | **Video** | `ffmpeg` frame at 1s (0s fallback) → in-process resize |
//!
//! All thumbnails are JPEG, quality 85, at most 170 pixels high.
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a thumbnail
//! - **Backends**: [`ThumbnailBackend`] trait + [`RustBackend`] + [`VipsBackend`]
//! - **Frames**: [`FrameExtractor`] trait + [`FfmpegFrameExtractor`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod frames;
pub mod operations;
mod params;
pub mod rust_backend;
pub mod vips_backend;

pub use backend::{BackendError, ThumbnailBackend};
pub use frames::{FfmpegFrameExtractor, FrameExtractor};
pub use operations::{ThumbnailConfig, create_image_thumbnail, create_video_thumbnail};
pub use params::{Quality, ThumbnailParams};
pub use rust_backend::RustBackend;
pub use vips_backend::VipsBackend;
