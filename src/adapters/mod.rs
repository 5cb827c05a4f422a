//! Adapter interfaces for external engines.
//!
//! The download protocol and the archive format live outside this crate.
//! They are reached only through the traits below:
//! - `DownloadEngine`: an aria2-style downloader
//! - `ArchiveEngine`: reads book metadata from archive files and opens readers

pub mod zim;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Book;

// Re-export the header-only ZIM engine
pub use zim::ZimHeaderEngine;

/// Errors raised by a download engine
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Unknown download id: {0}")]
    UnknownDownload(String),

    /// The request is no longer valid for the download (e.g. it already completed)
    #[error("Request rejected by download engine: {0}")]
    Rejected(String),

    #[error("Download engine failure: {0}")]
    Rpc(String),
}

/// Status reported by the download engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Active,
    Waiting,
    Paused,
    Error,
    Complete,
    Removed,
    Unknown,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadStatus::Active => "active",
            DownloadStatus::Waiting => "waiting",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Error => "error",
            DownloadStatus::Complete => "completed",
            DownloadStatus::Removed => "removed",
            DownloadStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Engine-side view of one download, fetched fresh on every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDownload {
    /// Engine download id
    pub did: String,

    pub status: DownloadStatus,

    /// Bytes downloaded so far
    pub completed_length: u64,

    /// Total bytes, 0 while unknown
    pub total_length: u64,

    /// Bytes per second
    pub download_speed: u64,

    /// Destination file, once the engine knows it
    pub path: Option<PathBuf>,
}

/// Options passed along with a start request (e.g. `("dir", "/downloads")`)
pub type DownloadOptions = Vec<(String, String)>;

/// Trait for download engines
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Start downloading `url`; returns the engine download id
    async fn start_download(&self, url: &str, options: &DownloadOptions) -> Result<String, EngineError>;

    /// Query the current state of a download
    ///
    /// With `force_refresh` the engine must not answer from a cache.
    async fn download(&self, did: &str, force_refresh: bool) -> Result<EngineDownload, EngineError>;

    async fn pause_download(&self, did: &str) -> Result<(), EngineError>;

    async fn resume_download(&self, did: &str) -> Result<(), EngineError>;

    async fn cancel_download(&self, did: &str) -> Result<(), EngineError>;
}

/// Errors raised by an archive engine
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Not a valid archive: {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("Archive engine does not support {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A search hit inside one archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub book_id: String,

    /// Entry path inside the archive
    pub path: String,

    pub title: String,

    /// Engine-provided relevance, higher is better
    pub score: f32,
}

/// An opened archive
pub trait ArchiveReader: Send + Sync {
    fn book_id(&self) -> &str;

    /// Full-text search inside this archive
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ArchiveError>;
}

/// Trait for archive engines
pub trait ArchiveEngine: Send + Sync {
    /// Read book metadata from an archive file
    ///
    /// Must fail with `ArchiveError::Invalid` when no valid id can be extracted.
    fn read_book(&self, path: &Path) -> Result<Book, ArchiveError>;

    /// Open a reader for a local book
    fn open_reader(&self, book: &Book) -> Result<Arc<dyn ArchiveReader>, ArchiveError>;
}
