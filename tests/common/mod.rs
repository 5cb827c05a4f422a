//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use zimshelf::adapters::{
    ArchiveEngine, ArchiveError, ArchiveReader, DownloadEngine, DownloadOptions, DownloadStatus,
    EngineDownload, EngineError, SearchHit,
};
use zimshelf::download::SpaceProbe;
use zimshelf::{Book, Library};

// ----------------------------------------------------------------------
// Download engine
// ----------------------------------------------------------------------

#[derive(Default)]
struct EngineState {
    downloads: HashMap<String, EngineDownload>,
    queries: HashMap<String, usize>,
    started: Vec<(String, DownloadOptions)>,
    next_id: usize,
    fail_start: bool,
    reject_actions: bool,
}

type QueryHook = Box<dyn Fn(&str) + Send + Sync>;

/// In-memory download engine with scriptable statuses
#[derive(Default)]
pub struct MockDownloadEngine {
    state: Mutex<EngineState>,
    on_query: Mutex<Option<QueryHook>>,
}

impl MockDownloadEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a download the engine already knows about
    pub fn insert(&self, did: &str, status: DownloadStatus, completed: u64, total: u64) {
        self.state.lock().unwrap().downloads.insert(
            did.to_string(),
            EngineDownload {
                did: did.to_string(),
                status,
                completed_length: completed,
                total_length: total,
                download_speed: 0,
                path: None,
            },
        );
    }

    pub fn set_status(&self, did: &str, status: DownloadStatus) {
        if let Some(d) = self.state.lock().unwrap().downloads.get_mut(did) {
            d.status = status;
        }
    }

    pub fn set_progress(&self, did: &str, completed: u64, speed: u64) {
        if let Some(d) = self.state.lock().unwrap().downloads.get_mut(did) {
            d.completed_length = completed;
            d.download_speed = speed;
        }
    }

    pub fn set_path(&self, did: &str, path: impl Into<PathBuf>) {
        if let Some(d) = self.state.lock().unwrap().downloads.get_mut(did) {
            d.path = Some(path.into());
        }
    }

    /// Make the engine forget a download
    pub fn forget(&self, did: &str) {
        self.state.lock().unwrap().downloads.remove(did);
    }

    pub fn fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    /// Reject pause/cancel as if the download had just completed
    pub fn reject_actions(&self, reject: bool) {
        self.state.lock().unwrap().reject_actions = reject;
    }

    /// Run `hook` at the start of every status query, before the lookup
    pub fn on_query(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_query.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn queries(&self, did: &str) -> usize {
        self.state.lock().unwrap().queries.get(did).copied().unwrap_or(0)
    }

    pub fn started(&self) -> Vec<(String, DownloadOptions)> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn status(&self, did: &str) -> Option<DownloadStatus> {
        self.state.lock().unwrap().downloads.get(did).map(|d| d.status)
    }

    fn transition(&self, did: &str, status: DownloadStatus) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_actions {
            return Err(EngineError::Rejected(format!("{} already complete", did)));
        }
        let download = state
            .downloads
            .get_mut(did)
            .ok_or_else(|| EngineError::UnknownDownload(did.to_string()))?;
        download.status = status;
        Ok(())
    }
}

#[async_trait]
impl DownloadEngine for MockDownloadEngine {
    async fn start_download(&self, url: &str, options: &DownloadOptions) -> Result<String, EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(EngineError::Rpc("engine offline".to_string()));
        }
        state.next_id += 1;
        let did = format!("gid{:04}", state.next_id);
        state.started.push((url.to_string(), options.clone()));
        state.downloads.insert(
            did.clone(),
            EngineDownload {
                did: did.clone(),
                status: DownloadStatus::Waiting,
                completed_length: 0,
                total_length: 0,
                download_speed: 0,
                path: None,
            },
        );
        Ok(did)
    }

    async fn download(&self, did: &str, _force_refresh: bool) -> Result<EngineDownload, EngineError> {
        if let Some(hook) = self.on_query.lock().unwrap().as_ref() {
            hook(did);
        }
        let mut state = self.state.lock().unwrap();
        *state.queries.entry(did.to_string()).or_default() += 1;
        state
            .downloads
            .get(did)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDownload(did.to_string()))
    }

    async fn pause_download(&self, did: &str) -> Result<(), EngineError> {
        self.transition(did, DownloadStatus::Paused)
    }

    async fn resume_download(&self, did: &str) -> Result<(), EngineError> {
        self.transition(did, DownloadStatus::Active)
    }

    async fn cancel_download(&self, did: &str) -> Result<(), EngineError> {
        self.transition(did, DownloadStatus::Removed)?;
        self.forget(did);
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Archive engine
// ----------------------------------------------------------------------

/// Archive engine reading fake archives: the first line of the file is the
/// book id, an empty file is invalid
#[derive(Default)]
pub struct MockArchiveEngine;

impl ArchiveEngine for MockArchiveEngine {
    fn read_book(&self, path: &Path) -> Result<Book, ArchiveError> {
        let content = std::fs::read_to_string(path)?;
        let id = content.lines().next().unwrap_or("").trim().to_string();
        if id.is_empty() {
            return Err(ArchiveError::Invalid {
                path: path.to_path_buf(),
                reason: "missing id".to_string(),
            });
        }

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Book::new(id, title).with_path(path).with_size(content.len() as u64))
    }

    fn open_reader(&self, book: &Book) -> Result<Arc<dyn ArchiveReader>, ArchiveError> {
        Ok(Arc::new(TitleReader {
            book_id: book.id.clone(),
            title: book.title.clone(),
        }))
    }
}

/// Reader whose only entry is the book title
pub struct TitleReader {
    book_id: String,
    title: String,
}

impl ArchiveReader for TitleReader {
    fn book_id(&self) -> &str {
        &self.book_id
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ArchiveError> {
        if limit == 0 || !self.title.to_lowercase().contains(&query.to_lowercase()) {
            return Ok(Vec::new());
        }
        Ok(vec![SearchHit {
            book_id: self.book_id.clone(),
            path: "A/Main_Page".to_string(),
            title: self.title.clone(),
            score: self.title.len() as f32,
        }])
    }
}

/// Write a fake archive holding `id`
pub fn write_archive(dir: &Path, name: &str, id: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("{}\n", id)).unwrap();
    path
}

// ----------------------------------------------------------------------
// Storage
// ----------------------------------------------------------------------

/// Space probe reporting a fixed amount (None: probe failure)
pub struct FixedSpace(pub Option<u64>);

impl SpaceProbe for FixedSpace {
    fn available_space(&self, _dir: &Path) -> io::Result<u64> {
        self.0
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "statvfs failed"))
    }
}

// ----------------------------------------------------------------------

/// Open a library backed by the mock archive engine in `temp/library`
pub fn open_library(temp: &TempDir) -> Arc<Library> {
    Arc::new(Library::open(temp.path().join("library"), Arc::new(MockArchiveEngine)).unwrap())
}
