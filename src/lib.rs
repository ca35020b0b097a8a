//! offlineu - Offline course library and progress tracker
//!
//! Turns a folder of course material (videos, audio, documents, subtitles,
//! quizzes) into a navigable tree and keeps per-item progress next to it so
//! a learner can pick up where they left off.
//!
//! # Architecture
//!
//! - A scan is a pure function of the folder contents and configuration
//! - Progress lives in one JSON file at the course root, written atomically
//! - Progress is never pruned; records for missing files are ignored on read
//!
//! # Modules
//!
//! - `core`: Tree building, classification, ledger, resume resolution
//! - `domain`: Data structures (Node, Item, ProgressRecord)
//! - `config`: Layered configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Show the course tree
//! offlineu scan ~/courses/rust
//!
//! # Where to continue
//! offlineu resume ~/courses/rust
//!
//! # Mark an item as done
//! offlineu mark "01 - Basics/1 - Intro.mp4" --course ~/courses/rust --completed
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{
    Course, CourseRegistry, ItemClassifier, ProgressLedger, ResumePointer, ResumeResolver,
    TreeBuilder,
};
pub use domain::{Category, DirectoryNode, Item, Node, ProgressRecord, ProgressUpdate};
