//! Monitored directory watcher.
//!
//! Watches archive directories and reconciles the library whenever an
//! archive file appears or disappears.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use glob::Pattern;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::library::{Library, ReconcileReport, DEFAULT_ARCHIVE_PATTERN};

/// Errors that can occur with the watcher
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Invalid archive pattern {0:?}")]
    Pattern(String),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Configuration for the watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Directories to watch (non-recursive)
    pub dirs: Vec<PathBuf>,

    /// Debounce window for filesystem events (milliseconds)
    pub debounce_ms: u64,

    /// File name pattern of archives
    pub pattern: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            debounce_ms: 1000,
            pattern: DEFAULT_ARCHIVE_PATTERN.to_string(),
        }
    }
}

impl WatcherConfig {
    /// Check that every watched directory exists and the pattern parses
    pub fn validate(&self) -> Result<Pattern, WatcherError> {
        for dir in &self.dirs {
            if !dir.is_dir() {
                return Err(WatcherError::DirectoryNotFound(dir.clone()));
            }
        }
        Pattern::new(&self.pattern).map_err(|_| WatcherError::Pattern(self.pattern.clone()))
    }
}

/// Event emitted after a watched directory was reconciled
#[derive(Debug, Clone)]
pub struct DirectoryChange {
    pub dir: PathBuf,
    pub report: ReconcileReport,
}

/// Watches monitored directories for a library
pub struct LibraryWatcher {
    config: WatcherConfig,
}

impl LibraryWatcher {
    /// Create a watcher with custom configuration
    pub fn with_config(config: WatcherConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Seed each directory from the library and reconcile it once.
    ///
    /// Archives that were removed while nothing was watching are dropped from
    /// the library; new ones are added.
    pub async fn scan_once(&self, library: &Arc<Library>) -> Result<Vec<DirectoryChange>> {
        self.config.validate()?;

        let mut changes = Vec::new();
        for dir in &self.config.dirs {
            library.seed_monitored_dir(dir);
            let report = library.spawn_reconcile(dir.clone()).await??;
            changes.push(DirectoryChange {
                dir: dir.clone(),
                report,
            });
        }
        Ok(changes)
    }

    /// Watch the directories and reconcile on change.
    /// This runs until stopped via the returned handle.
    pub fn watch(&self, library: Arc<Library>) -> Result<(mpsc::Receiver<DirectoryChange>, WatchHandle)> {
        let pattern = self.config.validate()?;

        let (event_tx, event_rx) = mpsc::channel::<DirectoryChange>(100);
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let config = self.config.clone();

        // Spawn watcher task
        let handle = tokio::spawn(async move {
            if let Err(e) = run_watcher(config, pattern, library, event_tx, &mut stop_rx).await {
                tracing::error!("Watcher error: {}", e);
            }
        });

        Ok((
            event_rx,
            WatchHandle {
                stop_tx,
                task: handle,
            },
        ))
    }
}

/// Handle to control the watcher
pub struct WatchHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watcher
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

/// Watched directories touched by a batch of changed paths
fn affected_dirs<'a, I>(paths: I, dirs: &[PathBuf], pattern: &Pattern) -> BTreeSet<PathBuf>
where
    I: IntoIterator<Item = &'a Path>,
{
    paths
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| pattern.matches(n))
                .unwrap_or(false)
        })
        .filter_map(|p| p.parent())
        .filter_map(|parent| dirs.iter().find(|d| d.as_path() == parent || same_dir(d, parent)))
        .cloned()
        .collect()
}

/// Compare directories after resolving symlinks (notify reports canonical paths on some platforms)
fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Internal watcher loop
async fn run_watcher(
    config: WatcherConfig,
    pattern: Pattern,
    library: Arc<Library>,
    event_tx: mpsc::Sender<DirectoryChange>,
    stop_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut debouncer = new_debouncer(Duration::from_millis(config.debounce_ms), tx)?;

    for dir in &config.dirs {
        debouncer.watcher().watch(dir, RecursiveMode::NonRecursive)?;
        library.seed_monitored_dir(dir);
        tracing::info!("Watching {} for archives", dir.display());
    }

    loop {
        // Check for stop signal
        if stop_rx.try_recv().is_ok() {
            tracing::info!("Watcher stopping...");
            break;
        }

        let dirty = match rx.try_recv() {
            Ok(Ok(events)) => affected_dirs(events.iter().map(|e| e.path.as_path()), &config.dirs, &pattern),
            Ok(Err(e)) => {
                tracing::warn!("Watcher error: {:?}", e);
                continue;
            }
            Err(std::sync::mpsc::TryRecvError::Empty) => {
                tokio::time::sleep(Duration::from_millis(250)).await;
                continue;
            }
            Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                tracing::error!("Watcher channel disconnected");
                break;
            }
        };

        for dir in dirty {
            match library.spawn_reconcile(dir.clone()).await {
                Ok(Ok(report)) => {
                    if !report.is_empty() {
                        let _ = event_tx.send(DirectoryChange { dir, report }).await;
                    }
                }
                Ok(Err(e)) => tracing::warn!("Failed to reconcile {}: {}", dir.display(), e),
                Err(e) => tracing::error!("Reconcile worker for {} failed: {}", dir.display(), e),
            }
        }
    }

    Ok(())
}
