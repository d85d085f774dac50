//! High-level thumbnail operations.
//!
//! These functions combine the configuration with backend execution: they
//! compute parameters, prepare the output location and call the backend.
//! Videos go through a frame extractor first and are always resized in
//! process.

use super::backend::{BackendError, ThumbnailBackend};
use super::frames::FrameExtractor;
use super::params::{Quality, ThumbnailParams};
use std::path::Path;
use tracing::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Frame offsets tried in order. Clips shorter than the first offset have no
/// frame there, so the very first frame is the fallback.
pub const FRAME_OFFSETS: [f64; 2] = [1.0, 0.0];

/// Configuration for thumbnail generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailConfig {
    pub max_height: u32,
    pub quality: Quality,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_height: 170,
            quality: Quality::default(),
        }
    }
}

/// Plan a thumbnail operation without executing it.
pub fn plan_thumbnail(source: &Path, output: &Path, config: &ThumbnailConfig) -> ThumbnailParams {
    ThumbnailParams {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        max_height: config.max_height,
        quality: config.quality,
    }
}

fn ensure_parent(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Create the thumbnail of a still image.
pub fn create_image_thumbnail(
    backend: &dyn ThumbnailBackend,
    source: &Path,
    output: &Path,
    config: &ThumbnailConfig,
) -> Result<()> {
    ensure_parent(output)?;
    backend.thumbnail(&plan_thumbnail(source, output, config))
}

/// Create the thumbnail of a video from one of its frames.
///
/// The frame is written into a private temporary directory that is removed
/// when this function returns, whatever the outcome.
pub fn create_video_thumbnail(
    frames: &dyn FrameExtractor,
    resizer: &dyn ThumbnailBackend,
    source: &Path,
    output: &Path,
    config: &ThumbnailConfig,
) -> Result<()> {
    let scratch = tempfile::Builder::new().prefix("indexer-frame").tempdir()?;
    let frame = scratch.path().join("frame.jpg");

    let mut last_error = None;
    for offset in FRAME_OFFSETS {
        if let Err(e) = frames.extract_frame(source, offset, &frame) {
            debug!(video = %source.display(), offset, error = %e, "frame extraction failed");
            last_error = Some(e);
        }
        // A failing run can still leave a usable frame behind
        if frame.exists() {
            break;
        }
        debug!(video = %source.display(), offset, "no frame at offset");
    }

    if !frame.exists() {
        return Err(last_error.unwrap_or_else(|| {
            BackendError::ProcessingFailed(format!(
                "no frame could be extracted from {}",
                source.display()
            ))
        }));
    }

    ensure_parent(output)?;
    resizer.thumbnail(&plan_thumbnail(&frame, output, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::test_helpers::write_jpeg;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Writes a frame only at the offsets it is told a frame exists at.
    struct ScriptedFrames {
        frame_at: Vec<f64>,
        fail: bool,
        calls: Mutex<Vec<(f64, PathBuf)>>,
    }

    impl ScriptedFrames {
        fn new(frame_at: &[f64]) -> Self {
            Self {
                frame_at: frame_at.to_vec(),
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn offsets(&self) -> Vec<f64> {
            self.calls.lock().unwrap().iter().map(|(o, _)| *o).collect()
        }

        fn frame_paths(&self) -> Vec<PathBuf> {
            self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
        }
    }

    impl FrameExtractor for ScriptedFrames {
        fn extract_frame(&self, _video: &Path, offset: f64, output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push((offset, output.to_path_buf()));
            if self.fail {
                return Err(BackendError::ProcessingFailed("ffmpeg exploded".into()));
            }
            if self.frame_at.contains(&offset) {
                write_jpeg(output, 320, 240);
            }
            Ok(())
        }
    }

    #[test]
    fn plan_uses_config() {
        let params = plan_thumbnail(
            Path::new("/source.jpg"),
            Path::new("/thumb.jpg"),
            &ThumbnailConfig::default(),
        );
        assert_eq!(params.max_height, 170);
        assert_eq!(params.quality.value(), 85);
    }

    #[test]
    fn image_thumbnail_creates_output_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::new();
        let output = tmp.path().join("1/2019/trip/a.jpg");

        create_image_thumbnail(&backend, Path::new("/a.jpg"), &output, &ThumbnailConfig::default())
            .unwrap();

        assert!(output.exists());
        assert_eq!(backend.get_operations().len(), 1);
    }

    #[test]
    fn video_uses_one_second_frame() {
        let tmp = tempfile::TempDir::new().unwrap();
        let frames = ScriptedFrames::new(&[1.0, 0.0]);
        let backend = MockBackend::new();
        let output = tmp.path().join("1/clip.jpg");

        create_video_thumbnail(
            &frames,
            &backend,
            Path::new("/clip.mov"),
            &output,
            &ThumbnailConfig::default(),
        )
        .unwrap();

        assert_eq!(frames.offsets(), vec![1.0]);
        assert!(output.exists());
    }

    #[test]
    fn short_video_retries_at_zero() {
        let tmp = tempfile::TempDir::new().unwrap();
        let frames = ScriptedFrames::new(&[0.0]);
        let backend = MockBackend::new();
        let output = tmp.path().join("1/clip.jpg");

        create_video_thumbnail(
            &frames,
            &backend,
            Path::new("/clip.mov"),
            &output,
            &ThumbnailConfig::default(),
        )
        .unwrap();

        assert_eq!(frames.offsets(), vec![1.0, 0.0]);
        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(ops[0].source.ends_with("frame.jpg"));
    }

    #[test]
    fn temporary_frame_is_removed_on_success_and_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let frames = ScriptedFrames::new(&[1.0]);
        create_video_thumbnail(
            &frames,
            &MockBackend::new(),
            Path::new("/clip.mov"),
            &tmp.path().join("ok.jpg"),
            &ThumbnailConfig::default(),
        )
        .unwrap();
        for path in frames.frame_paths() {
            assert!(!path.exists());
            assert!(!path.parent().unwrap().exists());
        }

        let frames = ScriptedFrames::new(&[1.0]);
        let result = create_video_thumbnail(
            &frames,
            &MockBackend::failing(),
            Path::new("/clip.mov"),
            &tmp.path().join("bad.jpg"),
            &ThumbnailConfig::default(),
        );
        assert!(result.is_err());
        for path in frames.frame_paths() {
            assert!(!path.exists());
        }
    }

    #[test]
    fn no_frame_anywhere_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let frames = ScriptedFrames {
            fail: true,
            ..ScriptedFrames::new(&[])
        };
        let backend = MockBackend::new();
        let result = create_video_thumbnail(
            &frames,
            &backend,
            Path::new("/clip.mov"),
            &tmp.path().join("clip.jpg"),
            &ThumbnailConfig::default(),
        );
        assert!(matches!(result, Err(BackendError::ProcessingFailed(m)) if m.contains("exploded")));
        assert_eq!(frames.offsets(), vec![1.0, 0.0]);
        assert!(backend.get_operations().is_empty());
    }
}
