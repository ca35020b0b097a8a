//! Persisted progress ledger for one course.
//!
//! The ledger is a single JSON document at the course root, keyed by item
//! relative path:
//!
//! ```text
//! {
//!   "01 - Basics/1 - Intro.mp4": {
//!     "completed": true,
//!     "elapsed_seconds": 312.0,
//!     "last_accessed": "2024-03-01T10:15:30Z"
//!   }
//! }
//! ```
//!
//! Records are only ever added or updated. Entries for files that no longer
//! exist are kept and reconciled against the live tree at read time.

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::path_guard::{normalize_relative, PathGuardError};
use crate::domain::{DirectoryNode, ProgressRecord, ProgressUpdate};

/// File name of the progress store inside a course root
pub const DEFAULT_LEDGER_FILE: &str = ".offlineu_progress.json";

/// Store name used by the earlier portal app; read when no current store exists
pub const LEGACY_LEDGER_FILE: &str = ".studyingportal_progress.json";

/// Ledger errors surfaced to callers
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid progress key {key:?}: {source}")]
    InvalidKey {
        key: String,
        #[source]
        source: PathGuardError,
    },

    #[error("Elapsed seconds must be finite and non-negative, got {0}")]
    InvalidElapsed(f64),

    #[error("Failed to serialize progress: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write progress store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How the ledger came to be when it was opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerStatus {
    /// No store on disk yet
    Fresh,

    /// Store read successfully
    Loaded { records: usize },

    /// No current store; records were imported from a legacy one, which
    /// stays untouched. The first save writes the current store.
    Migrated { from: PathBuf, records: usize },

    /// Store was unreadable or corrupt; started empty
    Recovered { reason: String },
}

#[derive(Debug, Default)]
struct LedgerState {
    records: BTreeMap<String, ProgressRecord>,

    /// Top-level entries that are not valid records, written back untouched
    foreign: Map<String, Value>,
}

impl LedgerState {
    fn parse(content: &str) -> Result<Self, serde_json::Error> {
        let document: Map<String, Value> = serde_json::from_str(content)?;
        let mut state = Self::default();

        for (key, value) in document {
            let is_key_normalized = normalize_relative(&key).is_ok_and(|k| k == key);
            let record = is_key_normalized
                .then(|| serde_json::from_value::<ProgressRecord>(value.clone()).ok())
                .flatten()
                .filter(ProgressRecord::is_valid);

            match record {
                Some(record) => {
                    state.records.insert(key, record);
                }
                None => {
                    debug!("Keeping non-record entry {:?} as is", key);
                    state.foreign.insert(key, value);
                }
            }
        }

        Ok(state)
    }

    fn to_document(&self) -> Result<Value, serde_json::Error> {
        let mut document = self.foreign.clone();
        for (key, record) in &self.records {
            document.insert(key.clone(), serde_json::to_value(record)?);
        }
        Ok(Value::Object(document))
    }
}

/// Process-lifetime progress map backed by one JSON file.
///
/// Reads share a lock; `update` and `save` hold the write lock across the
/// read-modify-write and the write to disk.
#[derive(Debug)]
pub struct ProgressLedger {
    store_path: PathBuf,
    state: RwLock<LedgerState>,
    status: LedgerStatus,
}

impl ProgressLedger {
    /// Load the ledger stored at the root of `course_root`
    pub fn load(course_root: &Path) -> Self {
        Self::open(course_root.join(DEFAULT_LEDGER_FILE))
    }

    /// Open the ledger at an explicit store path.
    ///
    /// Never fails: a missing store gives an empty ledger, or the records of
    /// a legacy store next to it. A corrupt one is copied aside to
    /// `<store>.corrupt` and also gives an empty ledger.
    pub fn open(store_path: impl Into<PathBuf>) -> Self {
        let store_path = store_path.into();

        let (state, status) = match fs::read_to_string(&store_path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => match read_legacy(&store_path) {
                Some((state, from)) => {
                    let records = state.records.len();
                    info!(
                        "Migrating {} progress records from {} to {}",
                        records,
                        from.display(),
                        store_path.display()
                    );
                    (state, LedgerStatus::Migrated { from, records })
                }
                None => {
                    debug!("No progress store at {}", store_path.display());
                    (LedgerState::default(), LedgerStatus::Fresh)
                }
            },
            Err(e) => {
                warn!(
                    "Progress store {} unreadable, starting empty: {}",
                    store_path.display(),
                    e
                );
                (
                    LedgerState::default(),
                    LedgerStatus::Recovered {
                        reason: e.to_string(),
                    },
                )
            }
            Ok(content) => match LedgerState::parse(&content) {
                Ok(state) => {
                    let records = state.records.len();
                    info!(
                        "Loaded {} progress records from {}",
                        records,
                        store_path.display()
                    );
                    (state, LedgerStatus::Loaded { records })
                }
                Err(e) => {
                    warn!(
                        "Progress store {} is corrupt, starting empty: {}",
                        store_path.display(),
                        e
                    );
                    set_aside(&store_path);
                    (
                        LedgerState::default(),
                        LedgerStatus::Recovered {
                            reason: e.to_string(),
                        },
                    )
                }
            },
        };

        Self {
            store_path,
            state: RwLock::new(state),
            status,
        }
    }

    /// Path of the backing JSON document
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// How the store looked when it was opened
    pub fn status(&self) -> &LedgerStatus {
        &self.status
    }

    /// Progress for one item, if any was recorded
    pub fn get(&self, relative_path: &str) -> Option<ProgressRecord> {
        let key = normalize_relative(relative_path).ok()?;
        self.state.read().records.get(&key).cloned()
    }

    /// Run `f` against all records under a single read lock
    pub fn with_records<R>(&self, f: impl FnOnce(&BTreeMap<String, ProgressRecord>) -> R) -> R {
        f(&self.state.read().records)
    }

    /// Copy of all records
    pub fn snapshot(&self) -> BTreeMap<String, ProgressRecord> {
        self.state.read().records.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Apply a partial update and persist before returning.
    ///
    /// If the store cannot be written the in-memory record is restored and
    /// the error returned, so memory never runs ahead of disk.
    pub fn update(
        &self,
        relative_path: &str,
        update: ProgressUpdate,
    ) -> Result<ProgressRecord, LedgerError> {
        let key = normalize_relative(relative_path).map_err(|source| LedgerError::InvalidKey {
            key: relative_path.to_string(),
            source,
        })?;

        if let Some(elapsed) = update.elapsed_seconds {
            if !elapsed.is_finite() || elapsed < 0.0 {
                return Err(LedgerError::InvalidElapsed(elapsed));
            }
        }

        let mut state = self.state.write();

        let previous = state.records.get(&key).cloned();
        let displaced = state.foreign.remove(&key);

        let mut record = previous.clone().unwrap_or_default();
        record.apply(&update, Utc::now());
        state.records.insert(key.clone(), record.clone());

        if let Err(e) = self.persist(&state) {
            match previous {
                Some(previous) => state.records.insert(key.clone(), previous),
                None => state.records.remove(&key),
            };
            if let Some(value) = displaced {
                state.foreign.insert(key, value);
            }
            return Err(e);
        }

        Ok(record)
    }

    /// Write the full map to disk atomically
    pub fn save(&self) -> Result<(), LedgerError> {
        let state = self.state.write();
        self.persist(&state)
    }

    /// Keys whose item is not in `tree` (renamed, moved or deleted files)
    pub fn stale_keys(&self, tree: &DirectoryNode) -> Vec<String> {
        let live: HashSet<&str> = tree
            .items()
            .into_iter()
            .map(|item| item.relative_path.as_str())
            .collect();

        self.state
            .read()
            .records
            .keys()
            .filter(|key| !live.contains(key.as_str()))
            .cloned()
            .collect()
    }

    /// Serialize to a temp file next to the store, then rename over it
    fn persist(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(&state.to_document()?)?;

        let write_err = |source| LedgerError::Write {
            path: self.store_path.clone(),
            source,
        };

        let dir = match self.store_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let prefix = self
            .store_path
            .file_name()
            .map(|name| {
                let mut prefix = name.to_os_string();
                prefix.push(".");
                prefix
            })
            .unwrap_or_else(|| OsString::from(".progress."));

        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(write_err)?;

        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.store_path)
            .map_err(|e| write_err(e.error))?;

        debug!(
            "Saved {} progress records to {}",
            state.records.len(),
            self.store_path.display()
        );
        Ok(())
    }
}

/// Read the legacy store sitting next to `store_path`, if there is a usable one
fn read_legacy(store_path: &Path) -> Option<(LedgerState, PathBuf)> {
    let legacy = store_path.with_file_name(LEGACY_LEDGER_FILE);
    if legacy == store_path {
        return None;
    }

    let content = match fs::read_to_string(&legacy) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Legacy progress store {} unreadable: {}", legacy.display(), e);
            return None;
        }
    };

    match LedgerState::parse(&content) {
        Ok(state) => Some((state, legacy)),
        Err(e) => {
            warn!("Ignoring corrupt legacy progress store {}: {}", legacy.display(), e);
            None
        }
    }
}

/// Keep a copy of a corrupt store before it gets overwritten
fn set_aside(store_path: &Path) {
    let mut backup = store_path.as_os_str().to_os_string();
    backup.push(".corrupt");
    let backup = PathBuf::from(backup);

    match fs::copy(store_path, &backup) {
        Ok(_) => info!("Copied corrupt progress store to {}", backup.display()),
        Err(e) => warn!("Could not copy corrupt progress store aside: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_in(temp: &TempDir) -> ProgressLedger {
        ProgressLedger::load(temp.path())
    }

    #[test]
    fn test_missing_store_is_fresh() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);

        assert_eq!(ledger.status(), &LedgerStatus::Fresh);
        assert!(ledger.is_empty());
        assert!(ledger.get("intro.mp4").is_none());
        assert!(!ledger.store_path().exists());
    }

    #[test]
    fn test_update_persists_immediately() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);

        ledger
            .update("intro.mp4", ProgressUpdate::default().with_completed(true))
            .unwrap();

        let reopened = ledger_in(&temp);
        assert_eq!(reopened.status(), &LedgerStatus::Loaded { records: 1 });
        assert!(reopened.get("intro.mp4").unwrap().completed);
    }

    #[test]
    fn test_disjoint_updates_merge() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);

        ledger
            .update("a/b.mp4", ProgressUpdate::default().with_completed(true))
            .unwrap();
        let record = ledger
            .update("a/b.mp4", ProgressUpdate::default().with_elapsed(120.0))
            .unwrap();

        assert!(record.completed);
        assert_eq!(record.elapsed_seconds, 120.0);
        assert!(record.last_accessed.is_none());
    }

    #[test]
    fn test_keys_are_normalized() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);

        ledger.update("./a\\b.mp4", ProgressUpdate::touch()).unwrap();
        assert!(ledger.get("a/b.mp4").is_some());

        let err = ledger
            .update("../escape.mp4", ProgressUpdate::touch())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidKey { .. }));
    }

    #[test]
    fn test_invalid_elapsed_rejected() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);

        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let err = ledger
                .update("a.mp4", ProgressUpdate::default().with_elapsed(bad))
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidElapsed(_)));
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_corrupt_store_recovered_and_set_aside() {
        let temp = TempDir::new().unwrap();
        let store = temp.path().join(DEFAULT_LEDGER_FILE);
        fs::write(&store, "{ not json").unwrap();

        let ledger = ledger_in(&temp);
        assert!(matches!(ledger.status(), LedgerStatus::Recovered { .. }));
        assert!(ledger.is_empty());

        let backup = temp
            .path()
            .join(format!("{}.corrupt", DEFAULT_LEDGER_FILE));
        assert_eq!(fs::read_to_string(backup).unwrap(), "{ not json");
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let temp = TempDir::new().unwrap();
        let ledger = ProgressLedger::open(temp.path().join("missing-dir").join("store.json"));

        let err = ledger
            .update("a.mp4", ProgressUpdate::default().with_completed(true))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Write { .. }));
        assert!(ledger.get("a.mp4").is_none());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);
        ledger.update("a.mp4", ProgressUpdate::touch()).unwrap();
        ledger.save().unwrap();

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![DEFAULT_LEDGER_FILE.to_string()]);
    }
}
