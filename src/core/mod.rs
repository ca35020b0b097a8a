//! Core course logic.
//!
//! This module contains:
//! - TreeBuilder: Folder walk into a course tree
//! - ItemClassifier: Name-based item categories
//! - ProgressLedger: Persisted per-item progress
//! - ResumeResolver: "Continue here" selection
//! - Course: A scanned tree bound to its ledger

pub mod classifier;
pub mod course;
pub mod ledger;
pub mod natural;
pub mod path_guard;
pub mod resume;
pub mod tree_builder;

// Re-export commonly used types
pub use classifier::{ClassifierConfig, ItemClassifier};
pub use course::{CompletionStats, Course, CourseError, CourseHandle, CourseRegistry};
pub use ledger::{
    LedgerError, LedgerStatus, ProgressLedger, DEFAULT_LEDGER_FILE, LEGACY_LEDGER_FILE,
};
pub use natural::natural_cmp;
pub use path_guard::{normalize_relative, PathGuard, PathGuardError};
pub use resume::{ResumePointer, ResumeReason, ResumeResolver};
pub use tree_builder::{Scan, ScanError, ScanSettings, ScanWarning, TreeBuilder};
