//! A loaded course: scanned tree plus its progress ledger.
//!
//! Operations take an explicit [`Course`]; the [`CourseRegistry`] only
//! remembers which course is currently active.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::classifier::ItemClassifier;
use super::ledger::{LedgerError, ProgressLedger, LEGACY_LEDGER_FILE};
use super::path_guard::{normalize_relative, PathGuard, PathGuardError};
use super::resume::{ResumePointer, ResumeResolver};
use super::tree_builder::{ScanError, ScanWarning, TreeBuilder};
use crate::config::Settings;
use crate::domain::{DirectoryNode, Neighbors, ProgressRecord, ProgressUpdate};

/// Errors from course-level operations
#[derive(Debug, Error)]
pub enum CourseError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Path(#[from] PathGuardError),

    #[error("No item at {0} in this course")]
    UnknownItem(String),
}

/// Identifier of one loaded course instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CourseHandle(Uuid);

impl CourseHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CourseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion figures for a course or one of its sections
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompletionStats {
    pub total: usize,
    pub completed: usize,
    /// Rounded to one decimal
    pub percentage: f64,
}

impl CompletionStats {
    /// Count live items under `node` whose ledger record is completed
    pub fn for_node(node: &DirectoryNode, ledger: &ProgressLedger) -> Self {
        let items = node.items();
        let total = items.len();
        let completed = ledger.with_records(|records| {
            items
                .iter()
                .filter(|item| {
                    records
                        .get(&item.relative_path)
                        .is_some_and(|r| r.completed)
                })
                .count()
        });

        let percentage = if total == 0 {
            0.0
        } else {
            (completed as f64 / total as f64 * 1000.0).round() / 10.0
        };

        Self {
            total,
            completed,
            percentage,
        }
    }
}

/// A scanned course with its ledger
#[derive(Debug)]
pub struct Course {
    handle: CourseHandle,
    name: String,
    guard: PathGuard,
    builder: TreeBuilder,
    tree: DirectoryNode,
    warnings: Vec<ScanWarning>,
    ledger: Arc<ProgressLedger>,
}

impl Course {
    /// Scan `root` and load its progress store
    pub fn load(root: &Path, settings: &Settings) -> Result<Self, CourseError> {
        let builder = TreeBuilder::new(ItemClassifier::new(&settings.classifier), &settings.scan)
            .with_reserved_prefix(settings.ledger_file.clone())
            .with_reserved_prefix(LEGACY_LEDGER_FILE);

        let scan = builder.scan(root)?;
        let guard = PathGuard::new(root).map_err(|e| ScanError::RootUnavailable {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        let ledger = Arc::new(ProgressLedger::open(guard.root().join(&settings.ledger_file)));

        let course = Self {
            handle: CourseHandle::new(),
            name: scan.tree.name.clone(),
            guard,
            builder,
            tree: scan.tree,
            warnings: scan.warnings,
            ledger,
        };

        info!(
            "Loaded course {:?}: {} items, {} progress records, {} scan warnings",
            course.name,
            course.tree.item_count(),
            course.ledger.len(),
            course.warnings.len()
        );

        Ok(course)
    }

    /// Re-scan the same root. The ledger is shared, never pruned.
    pub fn rescan(&self) -> Result<Self, CourseError> {
        let scan = self.builder.scan(self.guard.root())?;

        info!(
            "Rescanned course {:?}: {} items ({} before)",
            self.name,
            scan.tree.item_count(),
            self.tree.item_count()
        );

        Ok(Self {
            handle: CourseHandle::new(),
            name: scan.tree.name.clone(),
            guard: self.guard.clone(),
            builder: self.builder.clone(),
            tree: scan.tree,
            warnings: scan.warnings,
            ledger: Arc::clone(&self.ledger),
        })
    }

    pub fn handle(&self) -> CourseHandle {
        self.handle
    }

    /// Course name (the root folder's name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical course root
    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    pub fn tree(&self) -> &DirectoryNode {
        &self.tree
    }

    /// Warnings recorded by the scan that produced this course
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    /// Where the learner should continue
    pub fn resume(&self) -> Option<ResumePointer> {
        ResumeResolver::resolve(&self.tree, &self.ledger)
    }

    /// Completion over the whole course
    pub fn stats(&self) -> CompletionStats {
        CompletionStats::for_node(&self.tree, &self.ledger)
    }

    /// Progress of one item
    pub fn progress(&self, relative_path: &str) -> Option<ProgressRecord> {
        self.ledger.get(relative_path)
    }

    /// Record progress for an item of this course
    pub fn update_progress(
        &self,
        relative_path: &str,
        update: ProgressUpdate,
    ) -> Result<ProgressRecord, CourseError> {
        let key = normalize_relative(relative_path)?;
        if self.tree.find_item(&key).is_none() {
            return Err(CourseError::UnknownItem(key));
        }
        Ok(self.ledger.update(&key, update)?)
    }

    /// Previous/next items around an item
    pub fn neighbors(&self, relative_path: &str) -> Result<Neighbors, CourseError> {
        let key = normalize_relative(relative_path)?;
        self.tree
            .neighbors(&key)
            .ok_or(CourseError::UnknownItem(key))
    }

    /// Absolute path of a course file, confined to the root
    pub fn resolve_file(&self, relative_path: &str) -> Result<PathBuf, CourseError> {
        Ok(self.guard.resolve(relative_path)?)
    }

    /// Ledger keys with no matching item in the current tree
    pub fn stale_progress(&self) -> Vec<String> {
        self.ledger.stale_keys(&self.tree)
    }
}

/// Process-wide slot for the active course
#[derive(Debug, Default)]
pub struct CourseRegistry {
    active: RwLock<Option<Arc<Course>>>,
}

static REGISTRY: OnceLock<CourseRegistry> = OnceLock::new();

impl CourseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process
    pub fn global() -> &'static CourseRegistry {
        REGISTRY.get_or_init(CourseRegistry::new)
    }

    /// Make `course` the active one, replacing any previous course
    pub fn activate(&self, course: Course) -> Arc<Course> {
        let course = Arc::new(course);
        *self.active.write() = Some(Arc::clone(&course));
        info!("Active course is now {:?} ({})", course.name(), course.handle());
        course
    }

    /// The active course, if any
    pub fn active(&self) -> Option<Arc<Course>> {
        self.active.read().clone()
    }

    /// Unload the active course
    pub fn clear(&self) -> Option<Arc<Course>> {
        self.active.write().take()
    }
}
