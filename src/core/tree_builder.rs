//! Recursive scan of a course folder into a [`DirectoryNode`] tree.
//!
//! The walk is synchronous and single-threaded. Recoverable problems (an
//! unreadable directory, a symlink leaving the root, a link cycle) are
//! recorded as [`ScanWarning`]s and the scan carries on; only an unusable
//! root fails the whole build.

use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::classifier::ItemClassifier;
use super::natural::natural_cmp;
use super::path_guard::{child_key, PathGuard, PathGuardError};
use crate::domain::{Category, DirectoryNode, Item, Node};

/// Scan settings (the `scan` config section)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Glob patterns for hidden/system entries, matched against entry names
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    /// Deepest directory level that is still listed (default: 32)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Follow symlinks that stay inside the course root (default: true)
    #[serde(default = "default_follow_symlinks")]
    pub follow_symlinks: bool,
}

fn default_ignore() -> Vec<String> {
    [
        ".*",
        "Thumbs.db",
        "desktop.ini",
        "__MACOSX",
        "$RECYCLE.BIN",
        "System Volume Information",
        "*~",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_depth() -> usize {
    32
}

fn default_follow_symlinks() -> bool {
    true
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            ignore: default_ignore(),
            max_depth: default_max_depth(),
            follow_symlinks: default_follow_symlinks(),
        }
    }
}

/// Fatal scan errors
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Course root unavailable: {path} ({reason})")]
    RootUnavailable { path: PathBuf, reason: String },
}

/// Non-fatal conditions recorded during a scan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanWarning {
    #[error("Skipped directory {path}: {reason}")]
    SubtreeSkipped { path: String, reason: String },

    #[error("Skipped {path}: link target {target} is outside the course root")]
    PathEscape { path: String, target: String },

    #[error("Skipped {path}: symlink loops back to an enclosing directory")]
    SymlinkCycle { path: String },

    #[error("Skipped {path}: broken link ({reason})")]
    BrokenLink { path: String, reason: String },

    #[error("Skipped {path}: symlinks are not followed")]
    SymlinkSkipped { path: String },

    #[error("Skipped {path}: {reason}")]
    EntryUnreadable { path: String, reason: String },

    #[error("Skipped entry in {parent:?} with a non UTF-8 name: {name}")]
    NonUtf8Name { parent: String, name: String },

    #[error("Skipped {name:?} in {parent:?}: {reason}")]
    UnaddressableName {
        parent: String,
        name: String,
        reason: String,
    },
}

/// Result of a successful scan
#[derive(Debug, Clone)]
pub struct Scan {
    pub tree: DirectoryNode,
    pub warnings: Vec<ScanWarning>,
}

/// Builds course trees
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    classifier: ItemClassifier,
    ignore: Vec<Pattern>,
    reserved_prefixes: Vec<String>,
    max_depth: usize,
    follow_symlinks: bool,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new(ItemClassifier::default(), &ScanSettings::default())
    }
}

impl TreeBuilder {
    /// Create a builder. Invalid ignore patterns are logged and dropped.
    pub fn new(classifier: ItemClassifier, settings: &ScanSettings) -> Self {
        let ignore = settings
            .ignore
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring invalid ignore pattern {:?}: {}", p, e);
                    None
                }
            })
            .collect();

        Self {
            classifier,
            ignore,
            reserved_prefixes: Vec::new(),
            max_depth: settings.max_depth,
            follow_symlinks: settings.follow_symlinks,
        }
    }

    /// Never list entries whose name starts with `prefix` (ledger store and
    /// its temp files), whatever the ignore patterns say
    pub fn with_reserved_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_prefixes.push(prefix.into());
        self
    }

    /// Build the tree for `root`
    pub fn build(&self, root: &Path) -> Result<DirectoryNode, ScanError> {
        self.scan(root).map(|scan| scan.tree)
    }

    /// Build the tree for `root`, keeping the recorded warnings
    pub fn scan(&self, root: &Path) -> Result<Scan, ScanError> {
        let unavailable = |reason: String| ScanError::RootUnavailable {
            path: root.to_path_buf(),
            reason,
        };

        let metadata = fs::metadata(root).map_err(|e| unavailable(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(unavailable("not a directory".to_string()));
        }

        let guard = PathGuard::new(root).map_err(|e| unavailable(e.to_string()))?;
        let entries = read_entries(guard.root()).map_err(|e| unavailable(e.to_string()))?;

        let name = guard
            .root()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| guard.root().display().to_string());

        let mut walk = Walk {
            builder: self,
            guard: &guard,
            ancestors: vec![guard.root().to_path_buf()],
            warnings: Vec::new(),
        };

        let mut tree = DirectoryNode::new(name, "");
        tree.children = walk.children(entries, "", 0);

        debug!(
            "Scanned {}: {} items, {} warnings",
            guard.root().display(),
            tree.item_count(),
            walk.warnings.len()
        );

        Ok(Scan {
            tree,
            warnings: walk.warnings,
        })
    }

    fn is_ignored(&self, name: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };

        self.reserved_prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || self.ignore.iter().any(|p| p.matches_with(name, options))
    }
}

fn read_entries(dir: &Path) -> std::io::Result<Vec<fs::DirEntry>> {
    fs::read_dir(dir)?.collect()
}

/// State of one scan
struct Walk<'a> {
    builder: &'a TreeBuilder,
    guard: &'a PathGuard,
    /// Canonical directories on the current path from the root
    ancestors: Vec<PathBuf>,
    warnings: Vec<ScanWarning>,
}

impl Walk<'_> {
    fn record(&mut self, warning: ScanWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Turn one directory listing into sorted child nodes
    fn children(&mut self, entries: Vec<fs::DirEntry>, relative: &str, depth: usize) -> Vec<Node> {
        let mut children = Vec::with_capacity(entries.len());

        for entry in entries {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    self.record(ScanWarning::NonUtf8Name {
                        parent: relative.to_string(),
                        name: raw.to_string_lossy().into_owned(),
                    });
                    continue;
                }
            };

            if self.builder.is_ignored(&name) {
                continue;
            }

            let child_relative = match child_key(relative, &name) {
                Ok(key) => key,
                Err(e) => {
                    self.record(ScanWarning::UnaddressableName {
                        parent: relative.to_string(),
                        name,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if let Some(node) = self.entry(&entry, name, child_relative, depth) {
                children.push(node);
            }
        }

        children.sort_by(|a, b| natural_cmp(a.name(), b.name()));
        link_subtitles(&mut children);
        children
    }

    fn entry(
        &mut self,
        entry: &fs::DirEntry,
        name: String,
        relative: String,
        depth: usize,
    ) -> Option<Node> {
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                self.record(ScanWarning::EntryUnreadable {
                    path: relative,
                    reason: e.to_string(),
                });
                return None;
            }
        };

        if file_type.is_symlink() {
            return self.symlink(entry.path(), name, relative, depth);
        }

        if file_type.is_dir() {
            return Some(Node::Directory(self.directory(
                entry.path(),
                name,
                relative,
                depth + 1,
            )));
        }

        Some(self.item(name, relative))
    }

    fn symlink(&mut self, path: PathBuf, name: String, relative: String, depth: usize) -> Option<Node> {
        if !self.builder.follow_symlinks {
            self.record(ScanWarning::SymlinkSkipped { path: relative });
            return None;
        }

        let target = match self.guard.check_target(&path) {
            Ok(target) => target,
            Err(PathGuardError::Escape { path: target }) => {
                self.record(ScanWarning::PathEscape {
                    path: relative,
                    target,
                });
                return None;
            }
            Err(e) => {
                self.record(ScanWarning::BrokenLink {
                    path: relative,
                    reason: e.to_string(),
                });
                return None;
            }
        };

        match fs::metadata(&target) {
            Ok(meta) if meta.is_dir() => {
                if self.ancestors.contains(&target) {
                    self.record(ScanWarning::SymlinkCycle { path: relative });
                    return None;
                }
                Some(Node::Directory(self.directory(target, name, relative, depth + 1)))
            }
            Ok(_) => Some(self.item(name, relative)),
            Err(e) => {
                self.record(ScanWarning::BrokenLink {
                    path: relative,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// `path` must be canonical (a real directory inside the root)
    fn directory(&mut self, path: PathBuf, name: String, relative: String, depth: usize) -> DirectoryNode {
        if depth > self.builder.max_depth {
            let reason = format!("deeper than {} levels", self.builder.max_depth);
            self.record(ScanWarning::SubtreeSkipped {
                path: relative.clone(),
                reason: reason.clone(),
            });
            return DirectoryNode::skipped(name, relative, reason);
        }

        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                self.record(ScanWarning::SubtreeSkipped {
                    path: relative.clone(),
                    reason: e.to_string(),
                });
                return DirectoryNode::skipped(name, relative, e.to_string());
            }
        };

        debug!("Listing {} ({} entries)", relative, entries.len());

        self.ancestors.push(path);
        let children = self.children(entries, &relative, depth);
        self.ancestors.pop();

        let mut node = DirectoryNode::new(name, relative);
        node.children = children;
        node
    }

    fn item(&self, name: String, relative: String) -> Node {
        let category = self.builder.classifier.classify(&name);
        Node::Item(Item::new(relative, name, category))
    }
}

/// Pair each video/audio item with a sibling subtitle sharing its stem.
///
/// An exact stem match wins; otherwise a language-suffixed subtitle
/// (`lesson.en.srt` for `lesson.mp4`) is used. Stems compare
/// case-insensitively and the first match in sibling order is taken.
fn link_subtitles(children: &mut [Node]) {
    let subtitles: Vec<(String, String)> = children
        .iter()
        .filter_map(Node::as_item)
        .filter(|item| item.category == Category::Subtitle)
        .map(|item| (item.stem().to_lowercase(), item.relative_path.clone()))
        .collect();

    if subtitles.is_empty() {
        return;
    }

    for child in children.iter_mut() {
        let Node::Item(item) = child else { continue };
        if !item.category.is_media() {
            continue;
        }

        let stem = item.stem().to_lowercase();
        let suffixed = format!("{}.", stem);

        item.subtitle = subtitles
            .iter()
            .find(|(sub_stem, _)| *sub_stem == stem)
            .or_else(|| subtitles.iter().find(|(sub_stem, _)| sub_stem.starts_with(&suffixed)))
            .map(|(_, path)| path.clone());
    }
}
