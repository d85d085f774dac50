//! Pulling a still frame out of a video.

use std::ffi::OsString;
use std::path::Path;

use super::backend::BackendError;
use super::calculations::frame_timestamp;
use crate::tools::Tool;

/// Writes one frame of a video, taken at an offset, as an image file.
pub trait FrameExtractor: Send + Sync {
    fn extract_frame(
        &self,
        video: &Path,
        offset_secs: f64,
        output: &Path,
    ) -> Result<(), BackendError>;
}

/// Frame extraction with `ffmpeg -i <video> -ss <offset> -vframes 1 <out>`.
pub struct FfmpegFrameExtractor {
    tool: Tool,
}

impl FfmpegFrameExtractor {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    /// Whether `ffmpeg -version` runs.
    pub fn is_usable(&self) -> bool {
        self.tool.is_usable("-version")
    }
}

pub fn ffmpeg_args(video: &Path, offset_secs: f64, output: &Path) -> Vec<OsString> {
    vec![
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        video.as_os_str().to_owned(),
        "-ss".into(),
        frame_timestamp(offset_secs).into(),
        "-vframes".into(),
        "1".into(),
        output.as_os_str().to_owned(),
    ]
}

impl FrameExtractor for FfmpegFrameExtractor {
    fn extract_frame(
        &self,
        video: &Path,
        offset_secs: f64,
        output: &Path,
    ) -> Result<(), BackendError> {
        self.tool.run(ffmpeg_args(video, offset_secs, output))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_seek_to_offset() {
        let args: Vec<String> = ffmpeg_args(Path::new("/v/clip.mov"), 1.0, Path::new("/tmp/f.jpg"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-loglevel", "error", "-i", "/v/clip.mov", "-ss", "00:00:01.0", "-vframes", "1",
                "/tmp/f.jpg",
            ]
        );
    }

    #[test]
    fn missing_tool_is_not_usable() {
        assert!(!FfmpegFrameExtractor::new(Tool::new("/no/such/ffmpeg")).is_usable());
    }
}
