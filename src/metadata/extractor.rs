//! The metadata extractor capability.

use std::ffi::OsStr;
use std::path::Path;
use thiserror::Error;

use super::raw::RawMetadata;
use crate::tools::{Tool, ToolError};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("malformed extractor output: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Reads embedded metadata from a media file.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<RawMetadata, ExtractError>;
}

/// Extractor backed by the `exiftool` command.
///
/// Runs `exiftool -json -g -q <file>`: JSON output grouped by tag family
/// (`File`, `EXIF`, `QuickTime`, ...), values in their printed form so GPS
/// positions arrive as degrees/minutes/seconds strings.
pub struct ExifToolExtractor {
    tool: Tool,
}

impl ExifToolExtractor {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    /// Whether `exiftool -ver` runs.
    pub fn is_usable(&self) -> bool {
        self.tool.is_usable("-ver")
    }
}

impl MetadataExtractor for ExifToolExtractor {
    fn extract(&self, path: &Path) -> Result<RawMetadata, ExtractError> {
        let output = self.tool.run([
            OsStr::new("-json"),
            OsStr::new("-g"),
            OsStr::new("-q"),
            path.as_os_str(),
        ])?;
        let json = String::from_utf8_lossy(&output.stdout);
        Ok(RawMetadata::from_exiftool_json(&json)?)
    }
}
