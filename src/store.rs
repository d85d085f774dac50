//! The document store the pipeline commits to.
//!
//! The search engine itself is an external system; the pipeline only needs
//! four operations from it, captured by [`DocumentStore`]. Documents are keyed
//! by their aliased path.
//!
//! [`JsonDocumentStore`] is the bundled implementation: the whole index lives
//! in memory behind a lock and is written to a JSON file on [`flush`]. It is
//! adequate for libraries of a few hundred thousand items and doubles as the
//! store used in tests (see [`JsonDocumentStore::in_memory`]).
//!
//! [`flush`]: DocumentStore::flush

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use thiserror::Error;
use tracing::info;

use crate::types::Media;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Document store lock poisoned")]
    Poisoned,
    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

/// What the store remembers about an indexed path.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSignature {
    pub signature: String,
    pub file_modified: Option<DateTime<FixedOffset>>,
}

/// A single field predicate; all predicates of a [`Query`] must hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    PathPrefix(String),
    DayOfYearEquals(u16),
    DayOfYearAfter(u16),
    DayOfYearBefore(u16),
}

impl Predicate {
    fn matches(&self, media: &Media) -> bool {
        match self {
            Predicate::PathPrefix(prefix) => media.path.starts_with(prefix.as_str()),
            Predicate::DayOfYearEquals(day) => media.dayofyear == *day,
            Predicate::DayOfYearAfter(day) => media.dayofyear > *day,
            Predicate::DayOfYearBefore(day) => media.dayofyear < *day,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    DayOfYearAscending,
    DayOfYearDescending,
    DateTimeDescending,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub predicates: Vec<Predicate>,
    pub sort: Option<SortOrder>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn sort(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply this query to an iterator of documents.
    pub fn apply<'a>(&self, docs: impl Iterator<Item = &'a Media>) -> Vec<Media> {
        let mut matches: Vec<Media> = docs
            .filter(|m| self.predicates.iter().all(|p| p.matches(m)))
            .cloned()
            .collect();
        match self.sort {
            Some(SortOrder::DayOfYearAscending) => matches.sort_by_key(|m| m.dayofyear),
            Some(SortOrder::DayOfYearDescending) => {
                matches.sort_by_key(|m| std::cmp::Reverse(m.dayofyear))
            }
            Some(SortOrder::DateTimeDescending) => {
                matches.sort_by_key(|m| std::cmp::Reverse(m.datetime))
            }
            None => {}
        }
        if let Some(limit) = self.limit {
            matches.truncate(limit);
        }
        matches
    }
}

/// The operations the pipeline needs from the search index.
pub trait DocumentStore: Send + Sync {
    /// Signature and modify time of the document stored at `path`, if any.
    fn get(&self, path: &str) -> Result<Option<StoredSignature>, StoreError>;

    /// Insert or replace the document keyed by `media.path`.
    fn put(&self, media: &Media) -> Result<(), StoreError>;

    /// Remove the document at `path`. Removing a missing path is not an error.
    fn delete(&self, path: &str) -> Result<(), StoreError>;

    fn query(&self, query: &Query) -> Result<Vec<Media>, StoreError>;

    /// Make committed changes durable.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    documents: BTreeMap<String, Media>,
}

const STORE_VERSION: u32 = 1;

/// Document store persisted as a single JSON file.
pub struct JsonDocumentStore {
    path: Option<PathBuf>,
    documents: RwLock<BTreeMap<String, Media>>,
}

impl JsonDocumentStore {
    /// Open the store at `path`; a missing file starts an empty index.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let documents = match fs::read_to_string(&path) {
            Ok(content) => {
                let file: StoreFile = serde_json::from_str(&content)?;
                if file.version != STORE_VERSION {
                    return Err(StoreError::Unavailable(format!(
                        "{} has format version {}, expected {}",
                        path.display(),
                        file.version,
                        STORE_VERSION
                    )));
                }
                file.documents
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), documents = documents.len(), "opened document store");
        Ok(Self {
            path: Some(path),
            documents: RwLock::new(documents),
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full stored document at `path`.
    pub fn document(&self, path: &str) -> Option<Media> {
        self.documents
            .read()
            .ok()
            .and_then(|docs| docs.get(path).cloned())
    }
}

impl DocumentStore for JsonDocumentStore {
    fn get(&self, path: &str) -> Result<Option<StoredSignature>, StoreError> {
        let docs = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        Ok(docs.get(path).map(|m| StoredSignature {
            signature: m.signature.clone(),
            file_modified: m.filemodified,
        }))
    }

    fn put(&self, media: &Media) -> Result<(), StoreError> {
        let mut docs = self.documents.write().map_err(|_| StoreError::Poisoned)?;
        docs.insert(media.path.clone(), media.clone());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut docs = self.documents.write().map_err(|_| StoreError::Poisoned)?;
        docs.remove(path);
        Ok(())
    }

    fn query(&self, query: &Query) -> Result<Vec<Media>, StoreError> {
        let docs = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        Ok(query.apply(docs.values()))
    }

    fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let docs = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        let file = StoreFile {
            version: STORE_VERSION,
            documents: docs.clone(),
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}
