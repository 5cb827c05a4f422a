//! zimshelf - Offline archive library manager
//!
//! Keeps a library of offline content archives (ZIM files) in sync with the
//! disk and with an external download engine.
//!
//! # Architecture
//!
//! - The library is persisted as two XML files and rewritten on every save
//! - A background task polls the download engine and publishes snapshots
//! - Monitored directories are mirrored into the library on change
//!
//! # Modules
//!
//! - `adapters`: Download engine and archive engine seams (ZIM header reader)
//! - `domain`: Data structures (Book, Bookmark, events)
//! - `library`: Catalog, bookmarks, persistence, reconciliation
//! - `download`: Download coordinator, registry and snapshots
//! - `ingest`: Monitored directory watcher
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Add an archive
//! zimshelf open ~/zims/wikipedia_en_all.zim
//!
//! # List English books by size
//! zimshelf list --lang eng --sort size --desc
//!
//! # Mirror a directory
//! zimshelf reconcile ~/zims
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod download;
pub mod ingest;
pub mod library;

// Re-export main types at crate root for convenience
pub use adapters::{ArchiveEngine, ArchiveReader, DownloadEngine, ZimHeaderEngine};
pub use domain::{Book, Bookmark, DownloadEvent, LibraryEvent};
pub use download::{ActionOutcome, DownloadCoordinator, DownloadError, DownloadState};
pub use ingest::{LibraryWatcher, WatcherConfig};
pub use library::{BookFilter, Library, LibraryError, ReconcileReport, SortBy};
