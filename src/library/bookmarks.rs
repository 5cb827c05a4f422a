//! Bookmark list, persisted as `library.bookmarks.xml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::LibraryError;
use crate::domain::Bookmark;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "bookmarks")]
struct BookmarksFile {
    #[serde(rename = "bookmark", default)]
    bookmarks: Vec<Bookmark>,
}

/// All bookmarks, in insertion order
#[derive(Debug, Clone, Default)]
pub struct Bookmarks {
    items: Vec<Bookmark>,
}

impl Bookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `library.bookmarks.xml` content
    pub fn from_xml(xml: &str, origin: &Path) -> Result<Self, LibraryError> {
        let file: BookmarksFile = quick_xml::de::from_str(xml).map_err(|e| LibraryError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self { items: file.bookmarks })
    }

    /// Render `library.bookmarks.xml` content
    pub fn to_xml(&self) -> Result<String, LibraryError> {
        let file = BookmarksFile {
            bookmarks: self.items.clone(),
        };
        let body = quick_xml::se::to_string(&file).map_err(|e| LibraryError::Serialize(e.to_string()))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n", body))
    }

    /// Add a bookmark; an existing bookmark for the same book and url is replaced
    pub fn add(&mut self, bookmark: Bookmark) {
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|b| b.matches(&bookmark.book.id, &bookmark.url))
        {
            *existing = bookmark;
        } else {
            self.items.push(bookmark);
        }
    }

    /// Remove the bookmark for `url` in book `book_id`
    pub fn remove(&mut self, book_id: &str, url: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|b| !b.matches(book_id, url));
        self.items.len() != before
    }

    /// Bookmarks pointing into one book
    pub fn for_book<'a>(&'a self, book_id: &'a str) -> impl Iterator<Item = &'a Bookmark> + 'a {
        self.items.iter().filter(move |b| b.book.id == book_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bookmark> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
