//! Thumbnail manifest for idempotent re-runs.
//!
//! Generating a thumbnail means decoding a full-size photo or shelling out to
//! ffmpeg, by far the most expensive per-file work of a run. This manifest
//! lets the thumbnail check stage skip a file whose thumbnail already exists
//! and was produced from the same content with the same parameters.
//!
//! # Design
//!
//! ## Cache keys
//!
//! - **`source_hash`**: the content signature computed by the scanner.
//!   Content-based rather than mtime-based, so it survives copies and
//!   `touch`, and costs nothing extra since the scanner already has it.
//!
//! - **`params_hash`**: SHA-256 of the generation parameters (height cap and
//!   quality). If either changes, every thumbnail is regenerated.
//!
//! A thumbnail is current when:
//! 1. The manifest has an entry for its path with matching `source_hash` and
//!    `params_hash`
//! 2. The thumbnail file still exists on disk
//!
//! ## Content index
//!
//! Lookups for a *different* path with the same content go through a runtime
//! `content_index` mapping `"{source_hash}:{params_hash}"` to a stored
//! thumbnail path. When a file is renamed, or the same file lives under two
//! aliases, the existing thumbnail is copied instead of regenerated.
//!
//! ## Storage
//!
//! The manifest is a JSON file at `<thumbnails>/.thumbnail-manifest.json`, so
//! it travels with the thumbnail tree it describes. Paths inside it are
//! relative to the thumbnail root and use `/` separators.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the manifest file within the thumbnail root.
const MANIFEST_FILENAME: &str = ".thumbnail-manifest.json";

/// Version of the manifest format. Bump this to invalidate all existing
/// manifests when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

/// The content and parameters one thumbnail was generated from.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ThumbnailEntry {
    pub source_hash: String,
    pub params_hash: String,
}

/// On-disk manifest mapping thumbnail paths to their entries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ThumbnailManifest {
    pub version: u32,
    pub entries: HashMap<String, ThumbnailEntry>,
    /// Runtime reverse index: `"{source_hash}:{params_hash}"` → thumbnail path.
    /// Built at load time, maintained on insert. Never serialized.
    #[serde(skip)]
    content_index: HashMap<String, String>,
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{}:{}", source_hash, params_hash)
}

impl ThumbnailManifest {
    /// Create an empty manifest (first run or forced reindex).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Load from the thumbnail root. Returns an empty manifest if the file
    /// doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(thumbnail_root: &Path) -> Self {
        let path = manifest_path(thumbnail_root);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let mut manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable thumbnail manifest");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest.content_index = build_content_index(&manifest.entries);
        manifest
    }

    /// Save to the thumbnail root, creating it if needed.
    pub fn save(&self, thumbnail_root: &Path) -> io::Result<()> {
        std::fs::create_dir_all(thumbnail_root)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(thumbnail_root), json)
    }

    /// Whether the thumbnail at `thumb_path` was generated from this content
    /// with these parameters and is still on disk.
    pub fn is_current(
        &self,
        thumb_path: &str,
        source_hash: &str,
        params_hash: &str,
        thumbnail_root: &Path,
    ) -> bool {
        self.entries.get(thumb_path).is_some_and(|entry| {
            entry.source_hash == source_hash && entry.params_hash == params_hash
        }) && thumbnail_root.join(thumb_path).exists()
    }

    /// Look up an existing thumbnail of the same content at any path.
    ///
    /// Returns `Some(stored_path)` only if the file is still on disk. The
    /// returned path may differ from the caller's; copying is up to the caller.
    pub fn find_cached(
        &self,
        source_hash: &str,
        params_hash: &str,
        thumbnail_root: &Path,
    ) -> Option<String> {
        let stored_path = self.content_index.get(&content_key(source_hash, params_hash))?;
        if thumbnail_root.join(stored_path).exists() {
            Some(stored_path.clone())
        } else {
            None
        }
    }

    /// Record the entry for a thumbnail path.
    ///
    /// Other paths holding the same content keep their entries: the same file
    /// may legitimately be indexed under two aliases.
    pub fn insert(&mut self, thumb_path: String, source_hash: String, params_hash: String) {
        self.content_index
            .insert(content_key(&source_hash, &params_hash), thumb_path.clone());
        self.entries.insert(
            thumb_path,
            ThumbnailEntry {
                source_hash,
                params_hash,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the content_index reverse map from the entries map.
fn build_content_index(entries: &HashMap<String, ThumbnailEntry>) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(thumb_path, entry)| {
            (
                content_key(&entry.source_hash, &entry.params_hash),
                thumb_path.clone(),
            )
        })
        .collect()
}

/// SHA-256 hash of the thumbnail generation parameters.
pub fn hash_thumbnail_params(max_height: u32, quality: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"thumbnail\0");
    hasher.update(max_height.to_le_bytes());
    hasher.update(quality.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve the manifest path for a thumbnail root.
pub fn manifest_path(thumbnail_root: &Path) -> PathBuf {
    thumbnail_root.join(MANIFEST_FILENAME)
}
