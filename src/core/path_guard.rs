//! Confinement of path resolution to a course root.
//!
//! Every path the scanner follows and every relative path handed in from
//! outside (progress keys, file requests) goes through a [`PathGuard`] so
//! that nothing above it can reach outside the declared root.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Path containment violations
#[derive(Debug, Error)]
pub enum PathGuardError {
    #[error("Path escapes the course root: {path}")]
    Escape { path: String },

    #[error("Absolute paths are not accepted: {path}")]
    Absolute { path: String },

    #[error("Empty relative path")]
    Empty,

    #[error("Name does not round-trip as a relative path: {path}")]
    Unaddressable { path: String },

    #[error("Cannot resolve {path}: {source}")]
    Unresolvable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves paths strictly inside a canonical root directory
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Create a guard for `root`, which is canonicalized (symlinks resolved)
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathGuardError> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|source| PathGuardError::Unresolvable {
                path: root.display().to_string(),
                source,
            })?;
        Ok(Self { root: canonical })
    }

    /// The canonical root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether an already-canonical path lies at or below the root
    pub fn contains(&self, canonical: &Path) -> bool {
        canonical.starts_with(&self.root)
    }

    /// Canonicalize `path` and require it to stay inside the root
    pub fn check_target(&self, path: &Path) -> Result<PathBuf, PathGuardError> {
        let canonical = path
            .canonicalize()
            .map_err(|source| PathGuardError::Unresolvable {
                path: path.display().to_string(),
                source,
            })?;

        if self.contains(&canonical) {
            Ok(canonical)
        } else {
            Err(PathGuardError::Escape {
                path: canonical.display().to_string(),
            })
        }
    }

    /// Resolve a relative path to an absolute one inside the root.
    ///
    /// The path is validated lexically first. If the target exists it is
    /// canonicalized and must still be inside the root, which rejects
    /// symlinks pointing outward.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, PathGuardError> {
        let normalized = normalize_relative(relative)?;
        let joined = normalized
            .split('/')
            .fold(self.root.clone(), |acc, part| acc.join(part));

        if joined.symlink_metadata().is_ok() {
            self.check_target(&joined)?;
        }

        Ok(joined)
    }
}

/// Normalize a relative path to its canonical key form.
///
/// Backslashes become `/`, `.` segments and duplicate or surrounding slashes
/// are dropped. `..` segments and absolute paths are rejected.
pub fn normalize_relative(relative: &str) -> Result<String, PathGuardError> {
    let unified = relative.replace('\\', "/");

    if unified.starts_with('/') || Path::new(relative).is_absolute() || has_drive_prefix(&unified)
    {
        return Err(PathGuardError::Absolute {
            path: relative.to_string(),
        });
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(PathGuardError::Escape {
                    path: relative.to_string(),
                })
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(PathGuardError::Empty);
    }

    Ok(parts.join("/"))
}

/// Key of entry `name` inside the directory keyed `parent` ("" for the root).
///
/// The key must come back unchanged from [`normalize_relative`], otherwise
/// progress updates and file lookups could never address it. Names holding
/// a `\` or starting with a drive prefix (`Q: Review.mp4`) fail here.
pub fn child_key(parent: &str, name: &str) -> Result<String, PathGuardError> {
    let key = if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    };

    match normalize_relative(&key)? {
        normalized if normalized == key => Ok(key),
        _ => Err(PathGuardError::Unaddressable { path: key }),
    }
}

/// `C:` style prefixes, rejected on every platform
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
