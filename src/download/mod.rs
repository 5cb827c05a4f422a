//! Download tracking.
//!
//! - `DownloadCoordinator`: polls the download engine and handles user actions
//! - `DownloadRegistry`: book id → latest `DownloadState` snapshot
//! - `storage`: target directory checks before a download starts

pub mod coordinator;
pub mod registry;
pub mod state;
pub mod storage;

use thiserror::Error;

use crate::adapters::EngineError;
use crate::library::LibraryError;

pub use coordinator::{DownloadCoordinator, UpdaterHandle, DEFAULT_POLL_INTERVAL};
pub use registry::DownloadRegistry;
pub use state::{convert_to_units, DownloadState};
pub use storage::{FsSpaceProbe, SpaceProbe, StorageError};

/// Errors surfaced by download operations
#[derive(Debug, Error)]
pub enum DownloadError {
    /// No engine configured, or the engine failed to start the download
    #[error("Download unavailable: {0}")]
    DownloadUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Book not found: {0}")]
    NotFound(String),

    #[error("Download engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Library error: {0}")]
    Library(LibraryError),
}

impl From<LibraryError> for DownloadError {
    fn from(e: LibraryError) -> Self {
        match e {
            LibraryError::NotFound(id) => DownloadError::NotFound(id),
            other => DownloadError::Library(other),
        }
    }
}

/// Result of a pause or resume request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The engine carried out the request
    Applied,

    /// The engine state did not call for it (e.g. pausing a waiting download)
    Skipped,

    /// The download had already finished by the time the request ran
    AlreadyResolved,
}
