//! Configuration for zimshelf paths and polling.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ZIMSHELF_HOME, ZIMSHELF_LIBRARY, ZIMSHELF_DOWNLOADS)
//! 2. Config file (.zimshelf/config.yaml)
//! 3. Defaults (~/.zimshelf)
//!
//! Config file discovery:
//! - Searches current directory and parents for .zimshelf/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::download::DEFAULT_POLL_INTERVAL;
use crate::library::DEFAULT_ARCHIVE_PATTERN;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub downloads: Option<DownloadsConfig>,
    #[serde(default)]
    pub monitor: Option<MonitorConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .zimshelf/)
    pub home: Option<String>,
    /// Library directory holding library.xml (relative to project root)
    pub library: Option<String>,
    /// Default download target (relative to project root)
    pub downloads: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadsConfig {
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Directories whose archives are mirrored into the library
    #[serde(default)]
    pub dirs: Vec<String>,
    pub pattern: Option<String>,
    pub debounce_ms: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to zimshelf home
    pub home: PathBuf,
    /// Directory holding library.xml and library.bookmarks.xml
    pub library: PathBuf,
    /// Default download target
    pub downloads: PathBuf,
    /// Monitored directories
    pub monitor_dirs: Vec<PathBuf>,
    /// Archive file name pattern for monitored directories
    pub archive_pattern: String,
    /// Debounce window for the directory watcher
    pub debounce_ms: u64,
    /// Time between two download poll cycles
    pub poll_interval: Duration,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".zimshelf").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
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

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name).ok().map(PathBuf::from)
}

/// Merge a parsed config file (if any) with env vars and defaults
fn resolve(config_path: Option<&Path>, file: Option<ConfigFile>, default_home: PathBuf) -> ResolvedConfig {
    // Base directory is the parent of .zimshelf/ (i.e., grandparent of config.yaml)
    let state_dir = config_path.and_then(Path::parent).unwrap_or(Path::new("."));
    let base_dir = state_dir.parent().unwrap_or(Path::new("."));

    let paths = file.as_ref().map(|f| f.paths.clone()).unwrap_or_default();

    let home = env_path("ZIMSHELF_HOME")
        .or_else(|| paths.home.as_deref().map(|h| resolve_path(state_dir, h)))
        .unwrap_or(default_home);

    let library = env_path("ZIMSHELF_LIBRARY")
        .or_else(|| paths.library.as_deref().map(|l| resolve_path(base_dir, l)))
        .unwrap_or_else(|| home.clone());

    let downloads = env_path("ZIMSHELF_DOWNLOADS")
        .or_else(|| paths.downloads.as_deref().map(|d| resolve_path(base_dir, d)))
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| home.join("downloads"));

    let monitor = file.as_ref().and_then(|f| f.monitor.clone());
    let monitor_dirs = monitor
        .as_ref()
        .map(|m| m.dirs.iter().map(|d| resolve_path(base_dir, d)).collect())
        .unwrap_or_default();
    let archive_pattern = monitor
        .as_ref()
        .and_then(|m| m.pattern.clone())
        .unwrap_or_else(|| DEFAULT_ARCHIVE_PATTERN.to_string());
    let debounce_ms = monitor
        .as_ref()
        .and_then(|m| m.debounce_ms)
        .unwrap_or(DEFAULT_DEBOUNCE_MS);

    let poll_interval = file
        .as_ref()
        .and_then(|f| f.downloads.as_ref())
        .and_then(|d| d.poll_interval_ms)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_POLL_INTERVAL);

    ResolvedConfig {
        home,
        library,
        downloads,
        monitor_dirs,
        archive_pattern,
        debounce_ms,
        poll_interval,
        config_file: config_path.map(Path::to_path_buf),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".zimshelf");

    let config_file = find_config_file();
    let parsed = match &config_file {
        Some(path) => Some(load_config_file(path)?),
        None => None,
    };

    Ok(resolve(config_file.as_deref(), parsed, default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Get the library directory.
pub fn library_dir() -> Result<PathBuf> {
    Ok(config()?.library.clone())
}
