//! Run counters shared by the pipeline stages.
//!
//! Each component owns one counter group; the groups are bundled into
//! [`RunStats`], which the indexer hands to every stage behind an `Arc`.
//! Counters are relaxed atomics: they are only read once the pipeline has
//! drained, for the end-of-run report in [`crate::output`].

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Increment and return the new value.
    pub fn incr(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct ScanStats {
    pub directories_scanned: Counter,
    pub files_scanned: Counter,
    pub supported_files: Counter,
    pub signature_failures: Counter,
}

#[derive(Debug, Default)]
pub struct ExtractStats {
    pub invocations: Counter,
    pub failures: Counter,
}

#[derive(Debug, Default)]
pub struct LocationStats {
    pub lookups: Counter,
    pub failures: Counter,
    pub server_errors: Counter,
    pub malformed: Counter,
    pub cache_hits: Counter,
}

#[derive(Debug, Default)]
pub struct ThumbnailStats {
    /// Every request that reached the generator.
    pub attempted: Counter,
    pub generated_image: Counter,
    pub failed_image: Counter,
    pub generated_video: Counter,
    pub failed_video: Counter,
    /// Images the active backend has no decoder for.
    pub unsupported: Counter,
    pub skipped_current: Counter,
    /// Thumbnails copied from another path holding the same content.
    pub copied: Counter,
    pub failed_checks: Counter,
}

#[derive(Debug, Default)]
pub struct IndexStats {
    pub indexed: Counter,
    pub added: Counter,
    pub changed: Counter,
    pub unchanged: Counter,
    pub duplicates: Counter,
    pub failed_commits: Counter,
    pub media_scanned: Counter,
    pub removed: Counter,
}

/// All counters for one indexing run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub scan: ScanStats,
    pub extract: ExtractStats,
    pub location: LocationStats,
    pub thumbnails: ThumbnailStats,
    pub index: IndexStats,
}
