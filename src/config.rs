//! Indexer configuration.
//!
//! Configuration comes from an optional TOML file (`media-indexer.toml` in
//! the working directory unless `--config` names another). The file is
//! sparse: it is merged over the stock defaults, so it only needs the values
//! it changes. Unknown keys are rejected to catch typos early.
//!
//! ```toml
//! [paths]
//! document_store = "index/documents.json"
//! alias_store = "index/aliases.json"
//! thumbnails = "thumbnails"
//!
//! [tools]
//! exiftool = "exiftool"
//! ffmpeg = "ffmpeg"
//! vipsthumbnail = "vipsthumbnail"
//!
//! [location]
//! lookup_url = ""           # empty: no reverse geocoding
//! timeout_secs = 10
//! cache_precision = 3       # decimal places shared by one cache entry
//!
//! [pipeline]
//! queue_capacity = 10000
//! # max_workers = 4         # omit for auto (= CPU cores)
//!
//! [indexing]
//! force_reindex = false
//! change_policy = "signature"   # or "signature-and-modify-date"
//! ```
//!
//! Command line flags are applied on top of the loaded file by the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::changes::ChangePolicy;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "media-indexer.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexerConfig {
    pub paths: PathsConfig,
    pub tools: ToolsConfig,
    pub location: LocationConfig,
    pub pipeline: PipelineConfig,
    pub indexing: IndexingConfig,
}

/// Where the indexer keeps its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub document_store: PathBuf,
    pub alias_store: PathBuf,
    pub thumbnails: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            document_store: PathBuf::from("index/documents.json"),
            alias_store: PathBuf::from("index/aliases.json"),
            thumbnails: PathBuf::from("thumbnails"),
        }
    }
}

/// External programs, by name or path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub exiftool: PathBuf,
    pub ffmpeg: PathBuf,
    pub vipsthumbnail: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            exiftool: PathBuf::from("exiftool"),
            ffmpeg: PathBuf::from("ffmpeg"),
            vipsthumbnail: PathBuf::from("vipsthumbnail"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocationConfig {
    /// Base URL of the reverse geocoding service. Empty disables lookups.
    pub lookup_url: String,
    pub timeout_secs: u64,
    pub cache_precision: u32,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            lookup_url: String::new(),
            timeout_secs: 10,
            cache_precision: 3,
        }
    }
}

impl LocationConfig {
    pub fn is_enabled(&self) -> bool {
        !self.lookup_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Items each queue between two stages holds before senders block.
    pub queue_capacity: usize,
    /// Upper bound for any stage's worker pool.
    /// When absent, pools are sized from the CPU count alone.
    pub max_workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            max_workers: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexingConfig {
    pub force_reindex: bool,
    pub change_policy: ChangePolicy,
}

/// Number of CPU cores available to the worker pools.
///
/// `max_workers` can constrain the count down, never up.
pub fn effective_threads(config: &PipelineConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_workers.map(|n| n.clamp(1, cores)).unwrap_or(cores)
}

impl IndexerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "pipeline.queue_capacity must be at least 1".into(),
            ));
        }
        if self.pipeline.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "pipeline.max_workers must be at least 1".into(),
            ));
        }
        if self.location.cache_precision > 7 {
            return Err(ConfigError::Validation(
                "location.cache_precision must be 0-7".into(),
            ));
        }
        if self.location.is_enabled() {
            if self.location.timeout_secs == 0 {
                return Err(ConfigError::Validation(
                    "location.timeout_secs must be non-zero".into(),
                ));
            }
            let url = self.location.lookup_url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "location.lookup_url must be an http(s) URL, got {url:?}"
                )));
            }
        }
        for (key, path) in [
            ("paths.document_store", &self.paths.document_store),
            ("paths.alias_store", &self.paths.alias_store),
            ("paths.thumbnails", &self.paths.thumbnails),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        Ok(())
    }
}

/// The stock defaults as a `toml::Value::Table`, the base layer user
/// overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(IndexerConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. A missing file is `Ok(None)`.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<IndexerConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: IndexerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path`, falling back to the stock defaults when
/// it does not exist.
pub fn load_config(path: &Path) -> Result<IndexerConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// A fully-commented stock config file, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# Media Indexer Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# State locations
# ---------------------------------------------------------------------------
[paths]
# JSON file holding the indexed documents.
document_store = "index/documents.json"

# JSON file mapping scan roots to their short aliases.
alias_store = "index/aliases.json"

# Root of the thumbnail tree. Thumbnails mirror the aliased paths:
# <thumbnails>/<alias>/<dir>/<name.ext>.jpg
thumbnails = "thumbnails"

# ---------------------------------------------------------------------------
# External tools (name on PATH or full path)
# ---------------------------------------------------------------------------
[tools]
# Metadata extraction. Required.
exiftool = "exiftool"

# Video frame extraction. Required.
ffmpeg = "ffmpeg"

# Fast image thumbnails. Optional: without it images are resized in process
# and HEIC images get no thumbnail.
vipsthumbnail = "vipsthumbnail"

# ---------------------------------------------------------------------------
# Reverse geocoding
# ---------------------------------------------------------------------------
[location]
# Base URL of the place name service, called as
# GET <lookup_url>/api/v1/name?lat=<lat>&lon=<lon>
# Leave empty to index without place names.
lookup_url = ""

# Per-request timeout in seconds.
timeout_secs = 10

# Points sharing this many decimal places share one lookup.
cache_precision = 3

# ---------------------------------------------------------------------------
# Pipeline
# ---------------------------------------------------------------------------
[pipeline]
# Items each queue between two stages holds before the producer waits.
queue_capacity = 10000

# Upper bound for any stage's worker pool.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_workers = 4

# ---------------------------------------------------------------------------
# Change detection
# ---------------------------------------------------------------------------
[indexing]
# Reindex every file, even when the stored document is current.
force_reindex = false

# What makes a stored document current:
#   "signature"                 same file content
#   "signature-and-modify-date" same content and same modification time
change_policy = "signature"
"##
}
