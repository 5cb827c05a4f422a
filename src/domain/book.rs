//! Book and bookmark records as stored in the library files.
//!
//! Books serialize as attribute-only `<book/>` elements in `library.xml`;
//! bookmarks serialize as nested elements in `library.bookmarks.xml`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A book known to the library (local archive or remote catalog entry)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Book {
    /// Opaque book identifier (the archive UUID for ZIM files)
    #[serde(rename = "@id")]
    pub id: String,

    /// Local archive path, absent for books that are not on disk yet
    #[serde(rename = "@path", default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Remote URL the archive can be downloaded from
    #[serde(rename = "@url", default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    #[serde(rename = "@title", default)]
    pub title: String,

    #[serde(rename = "@description", default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// ISO 639-3 language code(s), comma separated
    #[serde(rename = "@language", default, skip_serializing_if = "String::is_empty")]
    pub language: String,

    #[serde(rename = "@creator", default, skip_serializing_if = "String::is_empty")]
    pub creator: String,

    #[serde(rename = "@publisher", default, skip_serializing_if = "String::is_empty")]
    pub publisher: String,

    #[serde(rename = "@name", default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(rename = "@flavour", default, skip_serializing_if = "String::is_empty")]
    pub flavour: String,

    /// Semicolon separated tag list
    #[serde(rename = "@tags", default, skip_serializing_if = "String::is_empty")]
    pub tags: String,

    /// Publication date (YYYY-MM-DD)
    #[serde(rename = "@date", default, skip_serializing_if = "String::is_empty")]
    pub date: String,

    #[serde(rename = "@articleCount", default)]
    pub article_count: u64,

    #[serde(rename = "@mediaCount", default)]
    pub media_count: u64,

    /// Archive size in bytes
    #[serde(rename = "@size", default)]
    pub size: u64,

    /// Downloader id of an in-flight download; empty when none
    #[serde(rename = "@downloadId", default, skip_serializing_if = "String::is_empty")]
    pub download_id: String,
}

impl Book {
    /// Create a book with just an id and title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the local path
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the remote URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the size in bytes
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the language code
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the tag list from individual tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = tags
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(";");
        self
    }

    /// Set the publication date (YYYY-MM-DD)
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    /// Set the download id
    pub fn with_download_id(mut self, download_id: impl Into<String>) -> Self {
        self.download_id = download_id.into();
        self
    }

    /// Individual tags
    pub fn tag_list(&self) -> impl Iterator<Item = &str> {
        self.tags.split(';').map(str::trim).filter(|t| !t.is_empty())
    }

    /// Parsed publication date, if well formed
    pub fn published_on(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()
    }

    /// Whether the archive is present on disk
    pub fn is_local(&self) -> bool {
        self.path.as_deref().map(Path::exists).unwrap_or(false)
    }

    /// Whether a download is in flight for this book
    pub fn is_downloading(&self) -> bool {
        !self.download_id.is_empty()
    }
}

/// A bookmarked article inside a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub book: BookmarkedBook,

    /// Article URL inside the archive
    pub url: String,

    /// Article title
    pub title: String,
}

/// The book part of a bookmark
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BookmarkedBook {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub date: String,
}

impl Bookmark {
    /// Bookmark an article of `book`
    pub fn new(book: &Book, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            book: BookmarkedBook {
                id: book.id.clone(),
                title: book.title.clone(),
                language: book.language.clone(),
                date: book.date.clone(),
            },
            url: url.into(),
            title: title.into(),
        }
    }

    /// Whether this bookmark points at `url` in book `book_id`
    pub fn matches(&self, book_id: &str, url: &str) -> bool {
        self.book.id == book_id && self.url == url
    }
}
