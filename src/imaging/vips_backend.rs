//! `vipsthumbnail` backend.
//!
//! Invoked as
//!
//! ```text
//! vipsthumbnail -d -s 10000x170 -o <out>[Q=85,optimize_coding,strip] <source>
//! ```
//!
//! `-d` keeps the output in device space, the huge width makes the height the
//! only binding constraint, and the output options request Huffman table
//! optimization and strip metadata from the thumbnail.

use std::ffi::OsString;

use super::backend::{BackendError, ThumbnailBackend};
use super::params::ThumbnailParams;
use crate::tools::Tool;

/// Width bound passed to vips; large enough to never constrain.
const UNBOUNDED_WIDTH: u32 = 10_000;

pub struct VipsBackend {
    tool: Tool,
}

impl VipsBackend {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    /// Whether `vipsthumbnail --vips-version` runs.
    pub fn is_usable(&self) -> bool {
        self.tool.is_usable("--vips-version")
    }
}

/// Command-line arguments for one thumbnail.
pub fn vips_args(params: &ThumbnailParams) -> Vec<OsString> {
    let mut output = params.output.as_os_str().to_owned();
    output.push(format!(
        "[Q={},optimize_coding,strip]",
        params.quality.value()
    ));
    vec![
        "-d".into(),
        "-s".into(),
        format!("{UNBOUNDED_WIDTH}x{}", params.max_height).into(),
        "-o".into(),
        output,
        params.source.as_os_str().to_owned(),
    ]
}

impl ThumbnailBackend for VipsBackend {
    fn name(&self) -> &'static str {
        "vips"
    }

    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError> {
        self.tool.run(vips_args(params))?;
        if !params.output.exists() {
            return Err(BackendError::ProcessingFailed(format!(
                "vipsthumbnail produced no output for {}",
                params.source.display()
            )));
        }
        Ok(())
    }
}
