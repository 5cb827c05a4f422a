//! Book library: catalog, bookmarks and monitored directories.
//!
//! # Storage Layout
//!
//! ```text
//! <library dir>/
//! ├── library.xml               # Catalog: one <book/> per book
//! └── library.bookmarks.xml     # Bookmarks
//! ```
//!
//! Both files are rewritten wholesale on every save. All state sits behind a
//! single mutex; a reconciliation pass holds it for its whole
//! read-diff-write sequence.

pub mod bookmarks;
pub mod catalog;
pub mod monitor;
pub mod search;

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glob::Pattern;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::adapters::{ArchiveEngine, ArchiveError, ArchiveReader};
use crate::domain::{Book, Bookmark, LibraryEvent};

pub use bookmarks::Bookmarks;
pub use catalog::{BookFilter, Catalog, SortBy};
pub use monitor::{MonitoredDirs, ReconcileReport};
pub use search::Searcher;

/// Catalog file name inside the library directory
pub const CATALOG_FILE: &str = "library.xml";

/// Bookmarks file name inside the library directory
pub const BOOKMARKS_FILE: &str = "library.bookmarks.xml";

/// Default file name pattern for archives in monitored directories
pub const DEFAULT_ARCHIVE_PATTERN: &str = "*.zim";

const EVENT_CAPACITY: usize = 64;

/// Errors that can occur with the library
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Invalid archive {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("Book not found: {0}")]
    NotFound(String),

    #[error("Invalid archive pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to serialize library: {0}")]
    Serialize(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

struct LibraryState {
    catalog: Catalog,
    bookmarks: Bookmarks,
    monitored: MonitoredDirs,
}

/// The book registry shared by the UI, the download coordinator and the
/// directory watcher
pub struct Library {
    dir: PathBuf,
    engine: Arc<dyn ArchiveEngine>,
    archive_pattern: Pattern,
    state: Mutex<LibraryState>,
    readers: Mutex<HashMap<String, Arc<dyn ArchiveReader>>>,
    events: broadcast::Sender<LibraryEvent>,
}

impl Library {
    /// Open the library stored in `dir`, reading both files if present
    pub fn open(dir: impl Into<PathBuf>, engine: Arc<dyn ArchiveEngine>) -> Result<Self, LibraryError> {
        let dir = dir.into();

        let catalog_path = dir.join(CATALOG_FILE);
        let catalog = match read_optional(&catalog_path)? {
            Some(xml) => Catalog::from_xml(&xml, &catalog_path)?,
            None => Catalog::new(),
        };

        let bookmarks_path = dir.join(BOOKMARKS_FILE);
        let bookmarks = match read_optional(&bookmarks_path)? {
            Some(xml) => Bookmarks::from_xml(&xml, &bookmarks_path)?,
            None => Bookmarks::new(),
        };

        tracing::info!(
            "Opened library {} ({} books, {} bookmarks)",
            dir.display(),
            catalog.len(),
            bookmarks.len()
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            dir,
            engine,
            archive_pattern: default_pattern(),
            state: Mutex::new(LibraryState {
                catalog,
                bookmarks,
                monitored: MonitoredDirs::new(),
            }),
            readers: Mutex::new(HashMap::new()),
            events,
        })
    }

    /// Use a different file name pattern for monitored directories
    pub fn with_archive_pattern(mut self, pattern: &str) -> Result<Self, LibraryError> {
        self.archive_pattern = Pattern::new(pattern).map_err(|e| LibraryError::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self)
    }

    /// The library directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Subscribe to library change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Books
    // ------------------------------------------------------------------

    /// Register the archive at `path` and return its book id.
    ///
    /// Opening a path that is already in the library returns the existing id
    /// without touching the catalog.
    pub fn open_book_from_path(&self, path: &Path) -> Result<String, LibraryError> {
        let mut state = self.state();

        if let Some(book) = state.catalog.get_by_path(path) {
            return Ok(book.id.clone());
        }

        let book = read_archive(self.engine.as_ref(), path)?;
        let id = book.id.clone();
        state.catalog.add(book);
        self.write_files(&state)?;
        drop(state);

        tracing::info!("Added book {} from {}", id, path.display());
        self.notify(LibraryEvent::BooksChanged);
        Ok(id)
    }

    /// Add or replace a book. Not persisted until `save`.
    pub fn add_book(&self, book: Book) -> bool {
        let added = self.state().catalog.add(book);
        self.notify(LibraryEvent::BooksChanged);
        added
    }

    /// Remove a book. Not persisted until `save`.
    pub fn remove_book_by_id(&self, id: &str) -> Option<Book> {
        let removed = self.state().catalog.remove(id);
        if removed.is_some() {
            self.readers().remove(id);
            self.notify(LibraryEvent::BooksChanged);
        }
        removed
    }

    /// A copy of the book with `id`
    pub fn book_by_id(&self, id: &str) -> Result<Book, LibraryError> {
        self.state()
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(id.to_string()))
    }

    /// A copy of the book stored at exactly `path`
    pub fn book_by_path(&self, path: &Path) -> Option<Book> {
        self.state().catalog.get_by_path(path).cloned()
    }

    /// Ids of all books
    pub fn book_ids(&self) -> Vec<String> {
        self.state().catalog.ids()
    }

    /// Ids of the books accepted by `filter`, sorted by `sort_by`
    pub fn list_book_ids(&self, filter: &BookFilter, sort_by: SortBy, ascending: bool) -> Vec<String> {
        self.state().catalog.filter_ids(filter, sort_by, ascending)
    }

    /// Number of books
    pub fn len(&self) -> usize {
        self.state().catalog.len()
    }

    /// Whether the library holds no books
    pub fn is_empty(&self) -> bool {
        self.state().catalog.is_empty()
    }

    // ------------------------------------------------------------------
    // Download bookkeeping (written through to disk)
    // ------------------------------------------------------------------

    /// Record the engine download id for a book
    pub fn set_download_id(&self, book_id: &str, download_id: &str) -> Result<(), LibraryError> {
        self.update_book(book_id, |book| {
            book.download_id = download_id.to_string();
        })
    }

    /// Forget the download id of a book. Returns false if it was already empty.
    pub fn clear_download_id(&self, book_id: &str) -> Result<bool, LibraryError> {
        let mut cleared = false;
        self.update_book(book_id, |book| {
            cleared = !book.download_id.is_empty();
            book.download_id.clear();
        })?;
        Ok(cleared)
    }

    /// Mark a download finished: record where the archive landed and clear
    /// the download id
    pub fn complete_download(&self, book_id: &str, path: Option<PathBuf>) -> Result<(), LibraryError> {
        self.update_book(book_id, |book| {
            if path.is_some() {
                book.path = path;
            }
            book.download_id.clear();
        })
    }

    fn update_book<F>(&self, book_id: &str, update: F) -> Result<(), LibraryError>
    where
        F: FnOnce(&mut Book),
    {
        let mut state = self.state();
        let book = state
            .catalog
            .get_mut(book_id)
            .ok_or_else(|| LibraryError::NotFound(book_id.to_string()))?;
        update(book);
        self.write_files(&state)?;
        drop(state);

        self.notify(LibraryEvent::BooksChanged);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bookmarks
    // ------------------------------------------------------------------

    pub fn add_bookmark(&self, bookmark: Bookmark) {
        self.state().bookmarks.add(bookmark);
        self.notify(LibraryEvent::BookmarksChanged);
    }

    /// Remove the bookmark for `url` in `book_id`; returns whether one existed
    pub fn remove_bookmark(&self, book_id: &str, url: &str) -> bool {
        let removed = self.state().bookmarks.remove(book_id, url);
        self.notify(LibraryEvent::BookmarksChanged);
        removed
    }

    /// A copy of all bookmarks
    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.state().bookmarks.iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write the catalog and the bookmarks to their files
    pub fn save(&self) -> Result<(), LibraryError> {
        let state = self.state();
        self.write_files(&state)
    }

    fn write_files(&self, state: &LibraryState) -> Result<(), LibraryError> {
        std::fs::create_dir_all(&self.dir)?;
        write_atomic(&self.dir, &self.dir.join(CATALOG_FILE), &state.catalog.to_xml()?)?;
        write_atomic(&self.dir, &self.dir.join(BOOKMARKS_FILE), &state.bookmarks.to_xml()?)?;
        tracing::debug!("Saved library to {}", self.dir.display());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Monitored directories
    // ------------------------------------------------------------------

    /// Record the library books already located in `dir` as the set seen on
    /// the previous pass. Returns that set.
    pub fn seed_monitored_dir(&self, dir: &Path) -> BTreeSet<PathBuf> {
        let mut state = self.state();
        let paths: BTreeSet<PathBuf> = state
            .catalog
            .books()
            .filter_map(|b| b.path.clone())
            .filter(|p| p.parent() == Some(dir))
            .collect();
        state.monitored.replace(dir, paths.clone());
        paths
    }

    /// The archive paths recorded for `dir` on the last pass
    pub fn monitored_paths(&self, dir: &Path) -> BTreeSet<PathBuf> {
        self.state().monitored.get(dir)
    }

    /// Bring the catalog in line with the archives currently in `dir`.
    ///
    /// New archives are added as books, books whose archive disappeared are
    /// removed, the recorded set is replaced, and the library is saved.
    pub fn reconcile_monitored_dir(&self, dir: &Path) -> Result<ReconcileReport, LibraryError> {
        let mut state = self.state();

        let current = monitor::scan_archives(dir, &self.archive_pattern)?;
        let previous = state.monitored.get(dir);
        let (added, removed) = monitor::diff(&previous, &current);
        state.monitored.replace(dir, current);

        let mut rejected = BTreeSet::new();
        for path in &added {
            match read_archive(self.engine.as_ref(), path) {
                Ok(book) => {
                    state.catalog.add(book);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    rejected.insert(path.clone());
                }
            }
        }

        for path in &removed {
            let id = state.catalog.get_by_path(path).map(|b| b.id.clone());
            if let Some(id) = id {
                state.catalog.remove(&id);
                self.readers().remove(&id);
            }
        }

        self.write_files(&state)?;
        drop(state);

        tracing::info!(
            "Reconciled {}: {} added, {} removed",
            dir.display(),
            added.len(),
            removed.len()
        );
        self.notify(LibraryEvent::BooksChanged);

        Ok(ReconcileReport {
            added,
            removed,
            rejected,
        })
    }

    /// Run one reconciliation of `dir` on a blocking worker
    pub fn spawn_reconcile(self: &Arc<Self>, dir: PathBuf) -> JoinHandle<Result<ReconcileReport, LibraryError>> {
        let library = Arc::clone(self);
        tokio::task::spawn_blocking(move || library.reconcile_monitored_dir(&dir))
    }

    // ------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------

    /// An opened reader for a local book, cached per book id
    pub fn reader(&self, book_id: &str) -> Option<Arc<dyn ArchiveReader>> {
        if let Some(reader) = self.readers().get(book_id) {
            return Some(Arc::clone(reader));
        }

        let book = self.book_by_id(book_id).ok()?;
        match self.engine.open_reader(&book) {
            Ok(reader) => {
                self.readers()
                    .insert(book_id.to_string(), Arc::clone(&reader));
                Some(reader)
            }
            Err(e) => {
                tracing::debug!("Cannot open reader for {}: {}", book_id, e);
                None
            }
        }
    }

    /// A searcher over the given books; None if any of them cannot be opened
    pub fn searcher<I, S>(&self, book_ids: I) -> Option<Searcher>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let readers = book_ids
            .into_iter()
            .map(|id| self.reader(id.as_ref()))
            .collect::<Option<Vec<_>>>()?;
        Some(Searcher::new(readers))
    }

    // ------------------------------------------------------------------

    fn state(&self) -> MutexGuard<'_, LibraryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn readers(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn ArchiveReader>>> {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: LibraryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if let Err(e) = self.save() {
            tracing::warn!("Failed to save library {} on shutdown: {}", self.dir.display(), e);
        }
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("dir", &self.dir)
            .field("archive_pattern", &self.archive_pattern.as_str())
            .finish_non_exhaustive()
    }
}

fn default_pattern() -> Pattern {
    Pattern::new(DEFAULT_ARCHIVE_PATTERN).unwrap_or_default()
}

/// Read a book from an archive, pinning its path to exactly `path`
fn read_archive(engine: &dyn ArchiveEngine, path: &Path) -> Result<Book, LibraryError> {
    let invalid = |reason: String| LibraryError::InvalidArchive {
        path: path.to_path_buf(),
        reason,
    };

    let mut book = engine.read_book(path).map_err(|e| match e {
        ArchiveError::Invalid { reason, .. } => invalid(reason),
        other => invalid(other.to_string()),
    })?;

    if book.id.is_empty() {
        return Err(invalid("archive has no id".to_string()));
    }

    book.path = Some(path.to_path_buf());
    Ok(book)
}

fn read_optional(path: &Path) -> Result<Option<String>, LibraryError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temp file in `dir`, then rename over `path`
fn write_atomic(dir: &Path, path: &Path, content: &str) -> Result<(), LibraryError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ZimHeaderEngine;
    use tempfile::TempDir;

    fn open(temp: &TempDir) -> Library {
        Library::open(temp.path(), Arc::new(ZimHeaderEngine::new())).unwrap()
    }

    #[test]
    fn test_open_missing_files_is_empty() {
        let temp = TempDir::new().unwrap();
        let library = open(&temp);
        assert!(library.is_empty());
        assert!(library.bookmarks().is_empty());
    }

    #[test]
    fn test_book_by_id_not_found() {
        let temp = TempDir::new().unwrap();
        let library = open(&temp);
        let err = library.book_by_id("missing").unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(id) if id == "missing"));
    }

    #[test]
    fn test_save_writes_both_files() {
        let temp = TempDir::new().unwrap();
        let library = open(&temp);
        let book = Book::new("wp", "Wikipedia");
        library.add_book(book.clone());
        library.add_bookmark(Bookmark::new(&book, "A/Rust", "Rust"));
        library.save().unwrap();

        assert!(temp.path().join(CATALOG_FILE).exists());
        assert!(temp.path().join(BOOKMARKS_FILE).exists());

        let reopened = open(&temp);
        assert_eq!(reopened.book_ids(), vec!["wp"]);
        assert_eq!(reopened.bookmarks().len(), 1);
    }

    #[test]
    fn test_invalid_archive_pattern() {
        let temp = TempDir::new().unwrap();
        let result = open(&temp).with_archive_pattern("[");
        assert!(matches!(result, Err(LibraryError::Pattern { .. })));
    }

    #[test]
    fn test_clear_download_id_reports_change() {
        let temp = TempDir::new().unwrap();
        let library = open(&temp);
        library.add_book(Book::new("wp", "Wikipedia").with_download_id("d1"));

        assert!(library.clear_download_id("wp").unwrap());
        assert!(!library.clear_download_id("wp").unwrap());
        assert!(library.clear_download_id("missing").is_err());
    }
}
