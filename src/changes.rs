//! Deduplication and change detection.
//!
//! Every candidate is classified against two things: the signatures already
//! seen in this run, and what the document store holds for its path.
//!
//! | Store holds path with | Signature seen this run | Result |
//! |---|---|---|
//! | same signature (and not forced) | any | `Unchanged` |
//! | other signature | yes | `Duplicate` |
//! | other signature | no | `Changed` |
//! | nothing | yes | `Duplicate` |
//! | nothing | no | `New` |
//!
//! Classification runs on a single worker in scan order, so which of two
//! identical files is indexed is the same from run to run.
//!
//! Every classified path is recorded as visited. Once the run is over,
//! [`ChangeDetector::remove_unvisited`] deletes the stored documents of the
//! alias whose files were not seen: they were deleted from disk. Two
//! exceptions:
//!
//! - A path whose new content duplicates another file of this run is not
//!   visited. Its stored document describes content the path no longer
//!   holds, so it is removed with the deleted files.
//! - Paths the scanner could not read are [kept](ChangeDetector::keep_unreadable),
//!   together with everything under them, since their files may still exist.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::alias::alias_prefix;
use crate::stats::RunStats;
use crate::store::{DocumentStore, Predicate, Query, StoreError, StoredSignature};
use crate::types::{CandidateFile, Change};

/// What makes a stored document current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangePolicy {
    /// Same content signature.
    #[default]
    Signature,
    /// Same content signature and same filesystem modification time, so
    /// metadata edited in place by a tool that preserves bytes it does not
    /// understand still gets reindexed.
    SignatureAndModifyDate,
}

impl ChangePolicy {
    fn is_current(self, stored: &StoredSignature, candidate: &CandidateFile) -> bool {
        stored.signature == candidate.signature
            && match self {
                ChangePolicy::Signature => true,
                ChangePolicy::SignatureAndModifyDate => stored.file_modified == candidate.modified,
            }
    }
}

pub struct ChangeDetector {
    store: Arc<dyn DocumentStore>,
    policy: ChangePolicy,
    force: bool,
    seen_signatures: Mutex<HashSet<String>>,
    visited_paths: Mutex<HashSet<String>>,
    /// `alias\path\` prefixes of unreadable files and directories.
    kept_prefixes: Mutex<Vec<String>>,
    stats: Arc<RunStats>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn DocumentStore>, policy: ChangePolicy, stats: Arc<RunStats>) -> Self {
        Self {
            store,
            policy,
            force: false,
            seen_signatures: Mutex::new(HashSet::new()),
            visited_paths: Mutex::new(HashSet::new()),
            kept_prefixes: Mutex::new(Vec::new()),
            stats,
        }
    }

    /// Treat every stored document as stale.
    pub fn force_reindex(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn classify(&self, candidate: &CandidateFile) -> Change {
        self.stats.index.media_scanned.incr();
        locked(&self.visited_paths).insert(candidate.aliased_path.clone());

        let stored = match self.store.get(&candidate.aliased_path) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(path = %candidate.aliased_path, error = %e, "unable to read stored document, treating as new");
                None
            }
        };

        let first_sighting = locked(&self.seen_signatures).insert(candidate.signature.clone());

        let change = match &stored {
            Some(stored) if !self.force && self.policy.is_current(stored, candidate) => {
                self.stats.index.unchanged.incr();
                Change::Unchanged
            }
            _ if !first_sighting => {
                self.stats.index.duplicates.incr();
                if stored.is_some() {
                    locked(&self.visited_paths).remove(&candidate.aliased_path);
                    debug!(path = %candidate.aliased_path, "now a duplicate, stored document is stale");
                }
                Change::Duplicate
            }
            Some(_) => Change::Changed,
            None => Change::New,
        };
        debug!(path = %candidate.aliased_path, ?change, "classified");
        change
    }

    pub fn was_visited(&self, aliased_path: &str) -> bool {
        locked(&self.visited_paths).contains(aliased_path)
    }

    /// Protect the documents at and under `aliased_path` from removal. The
    /// scanner could not read it, which does not mean it is gone.
    pub fn keep_unreadable(&self, aliased_path: &str) {
        let prefix = format!("{}\\", aliased_path.trim_end_matches('\\'));
        locked(&self.visited_paths).insert(aliased_path.to_string());
        locked(&self.kept_prefixes).push(prefix);
    }

    fn is_kept(&self, path: &str) -> bool {
        locked(&self.visited_paths).contains(path)
            || locked(&self.kept_prefixes)
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Delete the stored documents of `alias` whose paths were not visited.
    ///
    /// Returns the number of documents removed. In a dry run they are only
    /// counted.
    pub fn remove_unvisited(&self, alias: &str, dry_run: bool) -> Result<usize, StoreError> {
        let stored = self
            .store
            .query(&Query::new().filter(Predicate::PathPrefix(alias_prefix(alias))))?;
        let mut removed = 0;
        for media in stored.iter().filter(|m| !self.is_kept(&m.path)) {
            if !dry_run {
                self.store.delete(&media.path)?;
            }
            info!(path = %media.path, dry_run, "removing document of deleted file");
            self.stats.index.removed.incr();
            removed += 1;
        }
        Ok(removed)
    }
}
