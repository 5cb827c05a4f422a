//! Monitored directory ingestion.
//!
//! Archives dropped into (or deleted from) a monitored directory are picked
//! up by the library:
//!
//! ```text
//! monitored dir → Watcher → Library::spawn_reconcile → library.xml
//!                                     ↓
//!                              BooksChanged
//! ```

pub mod watcher;

// Re-export key types
pub use watcher::{DirectoryChange, LibraryWatcher, WatchHandle, WatcherConfig, WatcherError};
