//! Domain types for zimshelf.
//!
//! - Book / Bookmark: library records persisted as XML
//! - Events: change notifications for observers

pub mod book;
pub mod events;

// Re-export commonly used types
pub use book::{Book, Bookmark, BookmarkedBook};
pub use events::{DownloadEvent, LibraryEvent};
