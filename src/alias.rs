//! Alias registry: short, stable tokens standing in for absolute scan roots.
//!
//! Indexed paths are stored as `alias\relative\path` so the index stays valid
//! when the library moves to another machine or mount point; only the
//! registry entry has to be edited. Aliases are numeric strings allocated as
//! `max(existing) + 1`.
//!
//! The registry keeps an in-memory copy of the backing [`AliasStore`]. A
//! lookup miss reloads the store once before giving up, so aliases added by
//! another indexer process are picked up.
//!
//! Allocation is serialized within this process, but two processes adding a
//! new root at the same moment can still pick the same number: the store
//! has no compare-and-swap. That race is accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tracing::{info, warn};

/// Boundary between the alias and the relative path in an aliased path.
pub const ALIAS_SEPARATOR: char = '\\';

#[derive(Error, Debug)]
pub enum AliasError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown alias: {0}")]
    UnknownAlias(String),
    #[error("Alias {0} is already registered")]
    Conflict(String),
    #[error("Path {path} is not under the alias root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("Alias registry lock poisoned")]
    Poisoned,
}

/// One registered scan root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub alias: String,
    #[serde(rename = "aliaspath")]
    pub path: String,
    #[serde(rename = "datetimeadded")]
    pub date_added: DateTime<Utc>,
    #[serde(rename = "datetimelastindexed", default)]
    pub date_last_indexed: Option<DateTime<Utc>>,
}

/// Persistence for alias entries.
pub trait AliasStore: Send + Sync {
    /// Read every entry currently persisted.
    fn load(&self) -> Result<Vec<AliasEntry>, AliasError>;

    /// Persist a new entry. Fails with [`AliasError::Conflict`] if the alias
    /// is already present in the store.
    fn insert(&self, entry: &AliasEntry) -> Result<(), AliasError>;

    /// Replace the persisted entry with the same alias.
    fn update(&self, entry: &AliasEntry) -> Result<(), AliasError>;
}

/// Alias store backed by a pretty-printed JSON array on disk.
///
/// Every call re-reads the file so concurrent indexers see each other's
/// additions.
pub struct JsonAliasStore {
    path: PathBuf,
}

impl JsonAliasStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write(&self, entries: &[AliasEntry]) -> Result<(), AliasError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl AliasStore for JsonAliasStore {
    fn load(&self) -> Result<Vec<AliasEntry>, AliasError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn insert(&self, entry: &AliasEntry) -> Result<(), AliasError> {
        let mut entries = self.load()?;
        if entries
            .iter()
            .any(|e| e.alias.eq_ignore_ascii_case(&entry.alias))
        {
            return Err(AliasError::Conflict(entry.alias.clone()));
        }
        entries.push(entry.clone());
        self.write(&entries)
    }

    fn update(&self, entry: &AliasEntry) -> Result<(), AliasError> {
        let mut entries = self.load()?;
        let existing = entries
            .iter_mut()
            .find(|e| e.alias.eq_ignore_ascii_case(&entry.alias))
            .ok_or_else(|| AliasError::UnknownAlias(entry.alias.clone()))?;
        *existing = entry.clone();
        self.write(&entries)
    }
}

/// In-memory view of the alias store.
pub struct AliasRegistry {
    store: Box<dyn AliasStore>,
    entries: RwLock<Vec<AliasEntry>>,
    allocation: Mutex<()>,
}

impl AliasRegistry {
    /// Load every entry from `store`.
    pub fn open(store: Box<dyn AliasStore>) -> Result<Self, AliasError> {
        let entries = store.load()?;
        for entry in &entries {
            info!(alias = %entry.alias, path = %entry.path, "loaded alias");
        }
        Ok(Self {
            store,
            entries: RwLock::new(entries),
            allocation: Mutex::new(()),
        })
    }

    /// Snapshot of all known entries.
    pub fn entries(&self) -> Vec<AliasEntry> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn reload(&self) -> Result<(), AliasError> {
        let fresh = self.store.load()?;
        let mut entries = self.entries.write().map_err(|_| AliasError::Poisoned)?;
        *entries = fresh;
        Ok(())
    }

    fn find(&self, matches: impl Fn(&AliasEntry) -> bool) -> Option<AliasEntry> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.iter().find(|e| matches(e)).cloned())
    }

    fn find_by_path(&self, path: &str) -> Option<AliasEntry> {
        let wanted = path.to_lowercase();
        self.find(|e| e.path.to_lowercase() == wanted)
    }

    fn find_by_alias(&self, alias: &str) -> Option<AliasEntry> {
        let wanted = alias.to_lowercase();
        self.find(|e| e.alias.to_lowercase() == wanted)
    }

    /// Look up, reloading the store once on a miss.
    fn find_or_reload(
        &self,
        find: impl Fn(&Self) -> Option<AliasEntry>,
    ) -> Result<Option<AliasEntry>, AliasError> {
        if let Some(entry) = find(self) {
            return Ok(Some(entry));
        }
        self.reload()?;
        Ok(find(self))
    }

    /// Return the alias for `root`, registering a new one if needed.
    pub fn resolve_alias(&self, root: &Path) -> Result<String, AliasError> {
        let path = root.to_string_lossy();
        if let Some(entry) = self.find_or_reload(|r| r.find_by_path(&path))? {
            return Ok(entry.alias);
        }

        let _guard = self.allocation.lock().map_err(|_| AliasError::Poisoned)?;
        // Another thread may have allocated while we waited for the lock.
        self.reload()?;
        if let Some(entry) = self.find_by_path(&path) {
            return Ok(entry.alias);
        }

        let entry = AliasEntry {
            alias: next_alias(&self.entries()),
            path: path.into_owned(),
            date_added: Utc::now(),
            date_last_indexed: None,
        };
        warn!(alias = %entry.alias, path = %entry.path, "adding alias");
        self.store.insert(&entry)?;
        let alias = entry.alias.clone();
        self.entries
            .write()
            .map_err(|_| AliasError::Poisoned)?
            .push(entry);
        Ok(alias)
    }

    /// Root directory registered for `alias`.
    pub fn path_for_alias(&self, alias: &str) -> Result<PathBuf, AliasError> {
        self.find_or_reload(|r| r.find_by_alias(alias))?
            .map(|entry| PathBuf::from(entry.path))
            .ok_or_else(|| AliasError::UnknownAlias(alias.to_string()))
    }

    /// Expand an aliased path back into a full filesystem path.
    pub fn resolve_path(&self, aliased: &str) -> Result<PathBuf, AliasError> {
        let (alias, partial) = split_aliased_path(aliased);
        let root = self.path_for_alias(alias)?;
        if partial.is_empty() {
            Ok(root)
        } else {
            Ok(root.join(partial))
        }
    }

    pub fn is_valid_alias(&self, alias: &str) -> bool {
        self.find_by_alias(alias).is_some()
    }

    pub fn is_valid_aliased_path(&self, aliased: &str) -> bool {
        let (alias, _) = split_aliased_path(aliased);
        self.is_valid_alias(alias)
    }

    /// Stamp the alias with the current time as its last completed scan.
    pub fn record_last_indexed(&self, alias: &str) -> Result<(), AliasError> {
        let mut entry = self
            .find_by_alias(alias)
            .ok_or_else(|| AliasError::UnknownAlias(alias.to_string()))?;
        entry.date_last_indexed = Some(Utc::now());
        self.store.update(&entry)?;

        let mut entries = self.entries.write().map_err(|_| AliasError::Poisoned)?;
        if let Some(existing) = entries.iter_mut().find(|e| e.alias == entry.alias) {
            *existing = entry;
        }
        Ok(())
    }
}

/// Next alias: one past the largest numeric alias, or `"1"` if there is none.
pub fn next_alias(entries: &[AliasEntry]) -> String {
    entries
        .iter()
        .filter_map(|e| e.alias.trim().parse::<u64>().ok())
        .max()
        .map(|n| n + 1)
        .unwrap_or(1)
        .to_string()
}

/// Split `alias\rest\of\path` into the alias and a `/`-separated remainder.
pub fn split_aliased_path(aliased: &str) -> (&str, String) {
    match aliased.split_once(ALIAS_SEPARATOR) {
        Some((alias, rest)) => (alias, rest.replace(ALIAS_SEPARATOR, "/")),
        None => (aliased, String::new()),
    }
}

/// Build the aliased form of `full_path`, which must live under `root`.
pub fn to_aliased_path(alias: &str, root: &Path, full_path: &Path) -> Result<String, AliasError> {
    let relative = full_path
        .strip_prefix(root)
        .map_err(|_| AliasError::OutsideRoot {
            path: full_path.to_path_buf(),
            root: root.to_path_buf(),
        })?;
    let mut aliased = alias.to_string();
    for component in relative.components() {
        aliased.push(ALIAS_SEPARATOR);
        aliased.push_str(&component.as_os_str().to_string_lossy());
    }
    Ok(aliased)
}

/// Prefix shared by every aliased path under `alias`.
pub fn alias_prefix(alias: &str) -> String {
    format!("{alias}{ALIAS_SEPARATOR}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn entry(alias: &str, path: &str) -> AliasEntry {
        AliasEntry {
            alias: alias.to_string(),
            path: path.to_string(),
            date_added: Utc::now(),
            date_last_indexed: None,
        }
    }

    /// Store that counts loads, for checking the reload-on-miss behavior.
    #[derive(Default)]
    struct CountingStore {
        entries: Mutex<Vec<AliasEntry>>,
        loads: Arc<AtomicUsize>,
    }

    impl AliasStore for CountingStore {
        fn load(&self) -> Result<Vec<AliasEntry>, AliasError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.lock().unwrap().clone())
        }

        fn insert(&self, entry: &AliasEntry) -> Result<(), AliasError> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }

        fn update(&self, entry: &AliasEntry) -> Result<(), AliasError> {
            let mut entries = self.entries.lock().unwrap();
            let existing = entries.iter_mut().find(|e| e.alias == entry.alias).unwrap();
            *existing = entry.clone();
            Ok(())
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    #[test]
    fn next_alias_is_one_when_empty() {
        assert_eq!(next_alias(&[]), "1");
    }

    #[test]
    fn next_alias_is_max_plus_one_regardless_of_order() {
        assert_eq!(next_alias(&[entry("1", "/a"), entry("2", "/b")]), "3");
        assert_eq!(next_alias(&[entry("2", "/b"), entry("1", "/a")]), "3");
        assert_eq!(next_alias(&[entry("7", "/b"), entry("3", "/a")]), "8");
    }

    #[test]
    fn next_alias_ignores_non_numeric_aliases() {
        assert_eq!(next_alias(&[entry("dev", "/a"), entry("4", "/b")]), "5");
        assert_eq!(next_alias(&[entry("dev", "/a")]), "1");
    }

    #[test]
    fn resolve_alias_allocates_and_persists() {
        let tmp = TempDir::new().unwrap();
        let store_path = tmp.path().join("aliases.json");
        let registry = AliasRegistry::open(Box::new(JsonAliasStore::new(&store_path))).unwrap();

        assert_eq!(registry.resolve_alias(Path::new("/photos")).unwrap(), "1");
        assert_eq!(registry.resolve_alias(Path::new("/videos")).unwrap(), "2");
        assert_eq!(registry.resolve_alias(Path::new("/photos")).unwrap(), "1");

        let reopened = AliasRegistry::open(Box::new(JsonAliasStore::new(&store_path))).unwrap();
        assert_eq!(reopened.entries().len(), 2);
        assert_eq!(reopened.resolve_alias(Path::new("/videos")).unwrap(), "2");
    }

    #[test]
    fn resolve_alias_is_case_insensitive_on_path() {
        let store = CountingStore::default();
        store.entries.lock().unwrap().push(entry("3", "/Volumes/Photos"));
        let registry = AliasRegistry::open(Box::new(store)).unwrap();

        assert_eq!(
            registry.resolve_alias(Path::new("/volumes/photos")).unwrap(),
            "3"
        );
    }

    #[test]
    fn miss_reloads_store_before_allocating() {
        let loads = Arc::new(AtomicUsize::new(0));
        let store = CountingStore {
            entries: Mutex::new(Vec::new()),
            loads: loads.clone(),
        };
        let registry = AliasRegistry::open(Box::new(store)).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        registry.resolve_alias(Path::new("/new")).unwrap();
        // open + reload on miss + reload under the allocation lock
        assert_eq!(loads.load(Ordering::SeqCst), 3);

        registry.resolve_alias(Path::new("/new")).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn picks_up_alias_added_by_another_process() {
        let tmp = TempDir::new().unwrap();
        let store_path = tmp.path().join("aliases.json");
        let registry = AliasRegistry::open(Box::new(JsonAliasStore::new(&store_path))).unwrap();

        JsonAliasStore::new(&store_path)
            .insert(&entry("9", "/elsewhere"))
            .unwrap();

        assert_eq!(
            registry.path_for_alias("9").unwrap(),
            PathBuf::from("/elsewhere")
        );
        assert_eq!(registry.resolve_alias(Path::new("/next")).unwrap(), "10");
    }

    #[test]
    fn json_store_rejects_duplicate_alias() {
        let tmp = TempDir::new().unwrap();
        let store = JsonAliasStore::new(tmp.path().join("aliases.json"));
        store.insert(&entry("1", "/a")).unwrap();
        assert!(matches!(
            store.insert(&entry("1", "/b")),
            Err(AliasError::Conflict(a)) if a == "1"
        ));
    }

    // =========================================================================
    // Aliased paths
    // =========================================================================

    #[test]
    fn split_aliased_path_uses_first_separator() {
        assert_eq!(
            split_aliased_path("12\\2019\\trip\\img.jpg"),
            ("12", "2019/trip/img.jpg".to_string())
        );
        assert_eq!(split_aliased_path("12"), ("12", String::new()));
    }

    #[test]
    fn to_aliased_path_joins_components() {
        let aliased = to_aliased_path(
            "4",
            Path::new("/photos"),
            Path::new("/photos/2019/trip/img.jpg"),
        )
        .unwrap();
        assert_eq!(aliased, "4\\2019\\trip\\img.jpg");
    }

    #[test]
    fn to_aliased_path_rejects_foreign_path() {
        assert!(matches!(
            to_aliased_path("4", Path::new("/photos"), Path::new("/other/x.jpg")),
            Err(AliasError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn resolve_path_expands_aliased_path() {
        let store = CountingStore::default();
        store.entries.lock().unwrap().push(entry("2", "/photos"));
        let registry = AliasRegistry::open(Box::new(store)).unwrap();

        assert_eq!(
            registry.resolve_path("2\\2019\\img.jpg").unwrap(),
            PathBuf::from("/photos/2019/img.jpg")
        );
        assert_eq!(registry.resolve_path("2").unwrap(), PathBuf::from("/photos"));
        assert!(matches!(
            registry.resolve_path("5\\x.jpg"),
            Err(AliasError::UnknownAlias(a)) if a == "5"
        ));
    }

    #[test]
    fn validity_checks() {
        let store = CountingStore::default();
        store.entries.lock().unwrap().push(entry("2", "/photos"));
        let registry = AliasRegistry::open(Box::new(store)).unwrap();

        assert!(registry.is_valid_alias("2"));
        assert!(!registry.is_valid_alias("3"));
        assert!(registry.is_valid_aliased_path("2\\a\\b.jpg"));
        assert!(!registry.is_valid_aliased_path("3\\a\\b.jpg"));
    }

    #[test]
    fn record_last_indexed_updates_store() {
        let tmp = TempDir::new().unwrap();
        let store_path = tmp.path().join("aliases.json");
        let registry = AliasRegistry::open(Box::new(JsonAliasStore::new(&store_path))).unwrap();
        let alias = registry.resolve_alias(Path::new("/photos")).unwrap();

        registry.record_last_indexed(&alias).unwrap();

        let persisted = JsonAliasStore::new(&store_path).load().unwrap();
        assert!(persisted[0].date_last_indexed.is_some());
        assert!(matches!(
            registry.record_last_indexed("99"),
            Err(AliasError::UnknownAlias(_))
        ));
    }
}
