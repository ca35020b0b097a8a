//! Configuration for offlineu.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (OFFLINEU_COURSE, or AUTO_LOAD_COURSE)
//! 2. Config file (.offlineu/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - `$OFFLINEU_CONFIG` if set
//! - Otherwise searches current directory and parents for .offlineu/config.yaml
//! - Otherwise ~/.offlineu/config.yaml
//! - The `course` path is relative to the directory holding `.offlineu/`

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::classifier::ClassifierConfig;
use crate::core::ledger::DEFAULT_LEDGER_FILE;
use crate::core::tree_builder::ScanSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<Settings, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    /// Default course root
    pub course: Option<String>,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressConfig {
    /// Name of the progress store placed at each course root
    pub file_name: Option<String>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Course loaded when no path is given on the command line
    pub course: Option<PathBuf>,
    /// Extension sets and quiz keywords
    pub classifier: ClassifierConfig,
    /// Walk settings
    pub scan: ScanSettings,
    /// Progress store file name
    pub ledger_file: String,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            course: None,
            classifier: ClassifierConfig::default(),
            scan: ScanSettings::default(),
            ledger_file: DEFAULT_LEDGER_FILE.to_string(),
            config_file: None,
        }
    }
}

impl Settings {
    /// Course path from an explicit argument, falling back to the configured one
    pub fn course_path(&self, explicit: Option<PathBuf>) -> Result<PathBuf> {
        explicit.or_else(|| self.course.clone()).context(
            "No course path given. Pass one, set OFFLINEU_COURSE, or add `course:` to .offlineu/config.yaml",
        )
    }
}

/// Find config file: $OFFLINEU_CONFIG, then cwd and parents, then home
fn find_config_file() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("OFFLINEU_CONFIG") {
        return Some(PathBuf::from(explicit));
    }

    if let Ok(mut current) = std::env::current_dir() {
        loop {
            let config_path = current.join(".offlineu").join("config.yaml");
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                break;
            }
        }
    }

    dirs::home_dir()
        .map(|home| home.join(".offlineu").join("config.yaml"))
        .filter(|path| path.exists())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Course root from the environment (OFFLINEU_COURSE, then AUTO_LOAD_COURSE)
fn course_from_env() -> Option<PathBuf> {
    ["OFFLINEU_COURSE", "AUTO_LOAD_COURSE"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

/// The progress store must be a bare file name at the course root
fn validate_ledger_file(name: &str) -> Result<()> {
    let path = Path::new(name);
    let is_bare = path.file_name().is_some_and(|f| f == path.as_os_str());
    if name.is_empty() || !is_bare || name.contains(['/', '\\']) {
        anyhow::bail!("progress.file_name must be a plain file name, got {:?}", name);
    }
    Ok(())
}

/// Combine a parsed config file with the environment override
fn settings_from_file(
    config: ConfigFile,
    config_path: &Path,
    env_course: Option<PathBuf>,
) -> Result<Settings> {
    // Base directory is the parent of .offlineu/ (i.e., grandparent of config.yaml)
    let base_dir = config_path
        .parent()
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."));

    let course = env_course.or_else(|| {
        config
            .course
            .as_deref()
            .map(|course| resolve_path(base_dir, course))
    });

    let ledger_file = config
        .progress
        .file_name
        .unwrap_or_else(|| DEFAULT_LEDGER_FILE.to_string());
    validate_ledger_file(&ledger_file)?;

    Ok(Settings {
        course,
        classifier: config.classifier,
        scan: config.scan,
        ledger_file,
        config_file: Some(config_path.to_path_buf()),
    })
}

/// Load configuration from all sources
fn load_config() -> Result<Settings> {
    match find_config_file() {
        Some(config_path) => {
            let config = load_config_file(&config_path)?;
            settings_from_file(config, &config_path, course_from_env())
        }
        None => Ok(Settings {
            course: course_from_env(),
            ..Settings::default()
        }),
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static Settings> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
