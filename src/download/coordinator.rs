//! Download coordinator.
//!
//! Keeps the download registry in line with the download engine. A background
//! task polls the engine once per interval and publishes fresh snapshots;
//! user actions (pause, resume, cancel, dismiss) may run concurrently with a
//! poll. Both paths always re-read the book and re-query the engine before
//! acting, and treat "download id already empty" or "engine says it is too
//! late" as resolved outcomes rather than errors.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::storage::{self, FsSpaceProbe, SpaceProbe};
use super::{ActionOutcome, DownloadError, DownloadRegistry, DownloadState};
use crate::adapters::{DownloadEngine, DownloadOptions, DownloadStatus, EngineError};
use crate::domain::{Book, DownloadEvent};
use crate::library::{Library, LibraryError};

/// Default time between two poll cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 256;

pub struct DownloadCoordinator {
    library: Arc<Library>,
    engine: Option<Arc<dyn DownloadEngine>>,
    space: Arc<dyn SpaceProbe>,
    registry: DownloadRegistry,
    events: broadcast::Sender<DownloadEvent>,
    poll_interval: Duration,
}

impl DownloadCoordinator {
    /// Create a coordinator and restore bookkeeping for downloads that were
    /// in flight when the library was last saved.
    ///
    /// Without an engine, every download operation fails with
    /// `DownloadUnavailable`.
    pub fn new(library: Arc<Library>, engine: Option<Arc<dyn DownloadEngine>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let coordinator = Self {
            library,
            engine,
            space: Arc::new(FsSpaceProbe),
            registry: DownloadRegistry::new(),
            events,
            poll_interval: DEFAULT_POLL_INTERVAL,
        };
        coordinator.restore_downloads();
        coordinator
    }

    /// Use a different free-space probe
    pub fn with_space_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.space = probe;
        self
    }

    /// Use a different poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Whether a download engine is configured
    pub fn downloading_available(&self) -> bool {
        self.engine.is_some()
    }

    /// Subscribe to download notifications
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    /// Latest snapshot for a book
    pub fn download_state(&self, book_id: &str) -> Option<Arc<DownloadState>> {
        self.registry.get(book_id)
    }

    /// Book ids currently tracked
    pub fn tracked_books(&self) -> Vec<String> {
        self.registry.keys()
    }

    /// Time between two poll cycles
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Seed a paused placeholder for every book with a pending download id.
    /// Real values arrive with the first poll.
    fn restore_downloads(&self) {
        for book_id in self.library.book_ids() {
            let pending = self
                .library
                .book_by_id(&book_id)
                .map(|b| b.is_downloading())
                .unwrap_or(false);
            if pending {
                self.registry
                    .set(&book_id, Arc::new(DownloadState::paused_placeholder()));
            }
        }

        if !self.registry.is_empty() {
            tracing::info!("Restored {} pending downloads", self.registry.len());
        }
    }

    fn engine(&self) -> Result<&Arc<dyn DownloadEngine>, DownloadError> {
        self.engine
            .as_ref()
            .ok_or_else(|| DownloadError::DownloadUnavailable("no download engine configured".to_string()))
    }

    /// Current download id of a book, re-read from the library
    fn download_id(&self, book_id: &str) -> Result<String, DownloadError> {
        Ok(self.library.book_by_id(book_id)?.download_id)
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    /// Start downloading `book` into `target_dir`; returns the engine
    /// download id.
    ///
    /// The book is stored in the library with that id and the library is
    /// saved.
    pub async fn start_download(&self, book: &Book, target_dir: &Path) -> Result<String, DownloadError> {
        let engine = self.engine()?;
        storage::check_can_store(target_dir, book.size, self.space.as_ref())?;

        let options: DownloadOptions = vec![("dir".to_string(), target_dir.display().to_string())];
        let did = engine
            .start_download(&book.url, &options)
            .await
            .map_err(|e| {
                tracing::warn!("Failed to start download of {}: {}", book.id, e);
                DownloadError::DownloadUnavailable(e.to_string())
            })?;

        self.registry.set(&book.id, Arc::new(DownloadState::default()));
        self.library
            .add_book(book.clone().with_download_id(did.clone()));
        self.library.save()?;

        tracing::info!("Started download {} for {} into {}", did, book.id, target_dir.display());
        Ok(did)
    }

    /// Pause the download of a book if the engine reports it active
    pub async fn pause_download(&self, book_id: &str) -> Result<ActionOutcome, DownloadError> {
        let did = self.download_id(book_id)?;
        if did.is_empty() {
            // Completion was detected before the request got here
            tracing::debug!("Pause of {} ignored: download already resolved", book_id);
            return Ok(ActionOutcome::AlreadyResolved);
        }
        let engine = self.engine()?;

        let info = engine.download(&did, true).await?;
        if info.status != DownloadStatus::Active {
            return Ok(ActionOutcome::Skipped);
        }

        match engine.pause_download(&did).await {
            Ok(()) => {
                tracing::info!("Paused download {} for {}", did, book_id);
                Ok(ActionOutcome::Applied)
            }
            Err(EngineError::Rejected(reason)) => {
                tracing::debug!("Pause of {} raced with completion: {}", book_id, reason);
                Ok(ActionOutcome::AlreadyResolved)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resume the download of a book if the engine reports it paused
    pub async fn resume_download(&self, book_id: &str) -> Result<ActionOutcome, DownloadError> {
        let did = self.download_id(book_id)?;
        if did.is_empty() {
            tracing::debug!("Resume of {} ignored: download already resolved", book_id);
            return Ok(ActionOutcome::AlreadyResolved);
        }
        let engine = self.engine()?;

        let info = engine.download(&did, true).await?;
        if info.status != DownloadStatus::Paused {
            return Ok(ActionOutcome::Skipped);
        }

        engine.resume_download(&did).await?;
        tracing::info!("Resumed download {} for {}", did, book_id);
        Ok(ActionOutcome::Applied)
    }

    /// Cancel the download of a book.
    ///
    /// Returns true only if the engine actually cancelled it. The registry
    /// entry is kept; dismissing it is a separate `remove_download` call.
    pub async fn cancel_download(&self, book_id: &str) -> Result<bool, DownloadError> {
        let did = self.download_id(book_id)?;
        if did.is_empty() {
            tracing::debug!("Cancel of {} ignored: download already resolved", book_id);
            return Ok(false);
        }
        let engine = self.engine()?;

        match engine.cancel_download(&did).await {
            Ok(()) => {
                self.library.clear_download_id(book_id)?;
                tracing::info!("Cancelled download {} for {}", did, book_id);
                Ok(true)
            }
            Err(EngineError::Rejected(reason)) => {
                tracing::debug!("Cancel of {} raced with completion: {}", book_id, reason);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Forget the snapshot of a finished or failed download. Idempotent.
    pub fn remove_download(&self, book_id: &str) -> bool {
        self.registry.remove(book_id)
    }

    // ------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------

    /// One poll cycle over every tracked book
    pub async fn update_downloads(&self) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };

        for book_id in self.registry.keys() {
            let did = match self.library.book_by_id(&book_id) {
                Ok(book) => book.download_id,
                Err(e) => {
                    tracing::info!("Tracked book {} is gone: {}", book_id, e);
                    self.mark_disappeared(book_id);
                    continue;
                }
            };
            if did.is_empty() {
                // Completed or cancelled; the entry waits for dismissal
                continue;
            }

            let info = match engine.download(&did, true).await {
                Ok(info) => info,
                Err(e) => {
                    // A cancel or completion may have cleared the id while we were querying
                    if let Ok(book) = self.library.book_by_id(&book_id) {
                        if book.download_id != did {
                            tracing::debug!("Download {} for {} resolved during query", did, book_id);
                            continue;
                        }
                    }
                    tracing::info!("Download {} for {} disappeared: {}", did, book_id, e);
                    self.mark_disappeared(book_id);
                    continue;
                }
            };

            let state = Arc::new(DownloadState::from_engine(&info));
            if !self.registry.update(&book_id, Arc::clone(&state)) {
                // Dismissed while we were querying
                continue;
            }

            let completed = info.status == DownloadStatus::Complete;
            let path = info.path.clone();
            self.publish(DownloadEvent::Updated {
                book_id: book_id.clone(),
                info,
                state,
            });

            if completed {
                if let Err(e) = self.library.complete_download(&book_id, path.clone()) {
                    tracing::warn!("Failed to record completed download of {}: {}", book_id, e);
                }
                tracing::info!("Download of {} completed", book_id);
                self.publish(DownloadEvent::Completed { book_id, path });
            }
        }
    }

    /// Start the background poll loop.
    ///
    /// Returns None when no download engine is configured.
    pub fn start_updater(self: &Arc<Self>) -> Option<UpdaterHandle> {
        if !self.downloading_available() {
            return None;
        }

        let running = Arc::new(AtomicBool::new(true));
        let coordinator = Arc::clone(self);
        let flag = Arc::clone(&running);

        let task = tokio::spawn(async move {
            tracing::debug!("Download updater started");
            while flag.load(Ordering::SeqCst) {
                coordinator.update_downloads().await;
                tokio::time::sleep(coordinator.poll_interval).await;
            }
            tracing::debug!("Download updater stopped");
        });

        Some(UpdaterHandle { running, task })
    }

    /// Drop tracking for a download the engine or the library lost.
    /// Publishes `Disappeared` only if the entry was still tracked.
    fn mark_disappeared(&self, book_id: String) {
        if !self.registry.remove(&book_id) {
            tracing::debug!("Download of {} already dismissed", book_id);
            return;
        }

        match self.library.clear_download_id(&book_id) {
            Ok(_) | Err(LibraryError::NotFound(_)) => {}
            Err(e) => tracing::warn!("Failed to clear download id of {}: {}", book_id, e),
        }
        self.publish(DownloadEvent::Disappeared { book_id });
    }

    fn publish(&self, event: DownloadEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("downloading_available", &self.downloading_available())
            .field("tracked", &self.registry.len())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Handle to the background poll loop
pub struct UpdaterHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl UpdaterHandle {
    /// Whether the loop has not been asked to stop yet
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to stop and wait for the in-flight cycle to finish
    pub async fn shutdown(self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.task.await?;
        Ok(())
    }
}
