//! Domain types for offlineu.
//!
//! This module contains the core data structures:
//! - Category: name-based classification of course files
//! - Tree: directories and items discovered by a scan
//! - Progress: persisted per-item progress records

pub mod category;
pub mod progress;
pub mod tree;

// Re-export commonly used types
pub use category::Category;
pub use progress::{ProgressRecord, ProgressUpdate};
pub use tree::{DirectoryNode, Item, Neighbors, Node};
