//! Change notifications published to observers (the UI layer).
//!
//! Both the library and the download coordinator publish on
//! `tokio::sync::broadcast` channels; any number of observers can subscribe.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::EngineDownload;
use crate::download::DownloadState;

/// Library level notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryEvent {
    /// The set of books or their metadata changed
    BooksChanged,

    /// A bookmark was added or removed
    BookmarksChanged,
}

/// Download level notifications
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// A poll cycle produced a new snapshot
    Updated {
        book_id: String,
        info: EngineDownload,
        state: Arc<DownloadState>,
    },

    /// The engine no longer knows the download
    Disappeared { book_id: String },

    /// The engine reported the download complete
    Completed { book_id: String, path: Option<PathBuf> },
}

impl DownloadEvent {
    /// The book this event is about
    pub fn book_id(&self) -> &str {
        match self {
            DownloadEvent::Updated { book_id, .. }
            | DownloadEvent::Disappeared { book_id }
            | DownloadEvent::Completed { book_id, .. } => book_id,
        }
    }
}
