//! Filesystem scanning and content signatures.
//!
//! The scanner is the upstream-most producer of the pipeline. It walks a scan
//! root recursively, keeps the files that look like photos or videos, and
//! emits one [`CandidateFile`] per supported file, lazily, in file-name order.
//!
//! ## Classification
//!
//! A file is supported when its extension is in [`MEDIA_EXTENSIONS`]. Files
//! without an extension are sniffed by their leading bytes and kept if the
//! detected type is an image or a video. Hidden entries (dot-prefixed,
//! including macOS `._` resource forks) are never descended into or emitted.
//!
//! ## Signatures
//!
//! Each supported file gets a SHA-256 signature of its contents. Signatures are
//! content-based rather than mtime-based, so they are stable across copies,
//! checkouts and re-runs, and serve both deduplication and change detection.
//!
//! ## Failure policy
//!
//! A file or directory that can't be read is logged and skipped; it never
//! aborts the walk. Its aliased path is recorded in [`Scanner::unreadable`]
//! so the documents already indexed for it are not mistaken for deleted files.

use chrono::{DateTime, FixedOffset, Local};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::alias::{AliasError, to_aliased_path};
use crate::stats::RunStats;
use crate::types::CandidateFile;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Alias error: {0}")]
    Alias(#[from] AliasError),
    #[error("Scan root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Supported extensions (lowercase) and the MIME type each implies.
pub const MEDIA_EXTENSIONS: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("heic", "image/heic"),
    ("mov", "video/quicktime"),
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("avi", "video/x-msvideo"),
    ("mts", "video/mp2t"),
    ("3gp", "video/3gpp"),
];

/// Walks one scan root and produces candidates.
pub struct Scanner {
    root: PathBuf,
    alias: String,
    stats: Arc<RunStats>,
    unreadable: Mutex<Vec<String>>,
}

impl Scanner {
    pub fn new(
        root: impl Into<PathBuf>,
        alias: impl Into<String>,
        stats: Arc<RunStats>,
    ) -> Result<Self, ScanError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root));
        }
        Ok(Self {
            root,
            alias: alias.into(),
            stats,
            unreadable: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Aliased paths of the files and directories that could not be read.
    pub fn unreadable(&self) -> Vec<String> {
        self.unreadable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_unreadable(&self, path: Option<&Path>) {
        let aliased = path
            .and_then(|p| to_aliased_path(&self.alias, &self.root, p).ok())
            .unwrap_or_else(|| self.alias.clone());
        self.unreadable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(aliased);
    }

    /// Lazily enumerate every supported file under the root.
    ///
    /// Restartable: calling `scan` again walks the tree from the beginning.
    pub fn scan(&self) -> impl Iterator<Item = CandidateFile> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(move |entry| match entry {
                Ok(entry) => self.visit(&entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    self.record_unreadable(e.path());
                    None
                }
            })
    }

    fn visit(&self, entry: &DirEntry) -> Option<CandidateFile> {
        if entry.file_type().is_dir() {
            self.stats.scan.directories_scanned.incr();
            return None;
        }
        if !entry.file_type().is_file() {
            return None;
        }
        self.stats.scan.files_scanned.incr();

        let path = entry.path();
        let mime_type = classify(path)?;
        self.stats.scan.supported_files.incr();

        match self.candidate(path, mime_type) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                self.stats.scan.signature_failures.incr();
                warn!(path = %path.display(), error = %e, "unable to read supported file");
                self.record_unreadable(Some(path));
                None
            }
        }
    }

    fn candidate(&self, path: &Path, mime_type: String) -> Result<CandidateFile, ScanError> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Local>::from(t).fixed_offset());
        let signature = signature_of(path)?;
        let aliased_path = to_aliased_path(&self.alias, &self.root, path)?;
        debug!(path = %aliased_path, %signature, "candidate");

        Ok(CandidateFile {
            full_path: path.to_path_buf(),
            aliased_path,
            signature,
            length_in_bytes: metadata.len(),
            modified,
            mime_type,
            raw_metadata: None,
            warnings: Vec::new(),
        })
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// MIME type of a supported media file, `None` for anything else.
pub fn classify(path: &Path) -> Option<String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => {
            let ext = ext.to_ascii_lowercase();
            MEDIA_EXTENSIONS
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, mime)| mime.to_string())
        }
        None => sniff(path),
    }
}

fn sniff(path: &Path) -> Option<String> {
    let kind = infer::get_from_path(path).ok().flatten()?;
    match kind.matcher_type() {
        infer::MatcherType::Image | infer::MatcherType::Video => {
            Some(kind.mime_type().to_string())
        }
        _ => None,
    }
}

/// SHA-256 of a file's contents as lowercase hex.
///
/// Streams the file so large videos are never held in memory.
pub fn signature_of(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Convenience for producing the signature of in-memory bytes.
pub fn signature_of_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
