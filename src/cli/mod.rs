//! Command-line interface for zimshelf.
//!
//! Provides commands for listing and inspecting the library, adding and
//! removing archives, and mirroring monitored directories.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::ZimHeaderEngine;
use crate::config::{self, ResolvedConfig};
use crate::domain::Book;
use crate::download::storage::check_can_store;
use crate::download::{convert_to_units, DownloadCoordinator, FsSpaceProbe};
use crate::ingest::{LibraryWatcher, WatcherConfig};
use crate::library::{BookFilter, Library, SortBy};

/// zimshelf - Offline archive library manager
#[derive(Parser, Debug)]
#[command(name = "zimshelf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Library directory (overrides configuration)
    #[arg(long, global = true, env = "ZIMSHELF_LIBRARY")]
    pub library: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List books in the library
    List {
        /// Language codes (comma-separated, e.g. "eng,fra")
        #[arg(short, long)]
        lang: Option<String>,

        /// Text to look for in title or description
        #[arg(short, long)]
        query: Option<String>,

        /// Sort order: title, size, date, creator, publisher
        #[arg(short, long, default_value = "title")]
        sort: SortBy,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Only books with a local archive
        #[arg(long)]
        local: bool,

        /// Print books as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show details of a book
    Show {
        /// Book ID
        book_id: String,
    },

    /// Add an archive file to the library
    Open {
        /// Path to the archive
        path: PathBuf,
    },

    /// Remove a book from the library (the archive file is kept)
    Remove {
        /// Book ID
        book_id: String,
    },

    /// Mirror the archives of a directory into the library once
    Reconcile {
        /// Directory holding archives
        dir: PathBuf,
    },

    /// Watch the configured monitored directories until interrupted
    Watch,

    /// List bookmarks
    Bookmarks,

    /// List downloads recorded as in flight
    Downloads,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let library_dir = match self.library {
            Some(dir) => dir,
            None => config::library_dir()?,
        };

        match self.command {
            Commands::List {
                lang,
                query,
                sort,
                desc,
                local,
                json,
            } => {
                let filter = build_filter(lang, query, local);
                list_books(&library_dir, &filter, sort, desc, json).await
            }
            Commands::Show { book_id } => {
                show_book(&library_dir, &book_id).await
            }
            Commands::Open { path } => {
                open_archive(&library_dir, path).await
            }
            Commands::Remove { book_id } => {
                remove_book(&library_dir, &book_id).await
            }
            Commands::Reconcile { dir } => {
                reconcile_dir(&library_dir, dir).await
            }
            Commands::Watch => {
                watch_dirs(&library_dir).await
            }
            Commands::Bookmarks => {
                list_bookmarks(&library_dir).await
            }
            Commands::Downloads => {
                list_downloads(&library_dir).await
            }
            Commands::Config => {
                show_config().await
            }
        }
    }
}

fn build_filter(lang: Option<String>, query: Option<String>, local: bool) -> BookFilter {
    let mut filter = BookFilter::new();
    if local {
        filter = filter.local(true);
    }
    if let Some(lang) = lang {
        filter = filter.language(lang);
    }
    if let Some(query) = query {
        filter = filter.query(query);
    }
    filter
}

fn open_library(dir: &std::path::Path) -> Result<Arc<Library>> {
    let pattern = config::config()
        .map(|c| c.archive_pattern.clone())
        .unwrap_or_else(|_| crate::library::DEFAULT_ARCHIVE_PATTERN.to_string());

    let library = Library::open(dir, Arc::new(ZimHeaderEngine::new()))
        .with_context(|| format!("Failed to open library at {}", dir.display()))?
        .with_archive_pattern(&pattern)?;
    Ok(Arc::new(library))
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// List books in the library
async fn list_books(
    dir: &std::path::Path,
    filter: &BookFilter,
    sort: SortBy,
    desc: bool,
    json: bool,
) -> Result<()> {
    let library = open_library(dir)?;

    let books: Vec<Book> = library
        .list_book_ids(filter, sort, !desc)
        .iter()
        .filter_map(|id| library.book_by_id(id).ok())
        .collect();

    if json {
        let rows: Vec<serde_json::Value> = books
            .iter()
            .map(|b| {
                serde_json::json!({
                    "id": b.id,
                    "title": b.title,
                    "language": b.language,
                    "date": b.date,
                    "size": b.size,
                    "path": b.path,
                    "url": b.url,
                    "tags": b.tag_list().collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if library.is_empty() {
        println!("Library is empty. Use 'zimshelf open <path>' to add an archive.");
        return Ok(());
    }

    println!("{:<38} {:<6} {:<10} {:<40}", "ID", "LANG", "SIZE", "TITLE");
    println!("{}", "-".repeat(96));

    for book in &books {
        println!(
            "{:<38} {:<6} {:<10} {:<40}",
            book.id,
            book.language,
            convert_to_units(book.size),
            truncate(&book.title, 40)
        );
    }

    println!("\nShowing {} of {} books", books.len(), library.len());

    Ok(())
}

/// Show details of a book
async fn show_book(dir: &std::path::Path, book_id: &str) -> Result<()> {
    let library = open_library(dir)?;
    let book = library.book_by_id(book_id)?;

    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("  ID: {}", book.id);
    println!("  Title: {}", book.title);
    if !book.description.is_empty() {
        println!("  Description: {}", book.description);
    }
    println!("  Language: {}", book.language);
    if !book.creator.is_empty() {
        println!("  Creator: {}", book.creator);
    }
    if !book.publisher.is_empty() {
        println!("  Publisher: {}", book.publisher);
    }
    if let Some(date) = book.published_on() {
        println!("  Date: {}", date);
    }
    println!("  Size: {}", convert_to_units(book.size));
    println!("  Articles: {}", book.article_count);
    match &book.path {
        Some(path) if book.is_local() => println!("  Path: {}", path.display()),
        Some(path) => println!("  Path: {} (missing)", path.display()),
        None => println!("  Path: (remote)"),
    }
    if !book.url.is_empty() {
        println!("  URL: {}", book.url);
    }
    let tags: Vec<&str> = book.tag_list().collect();
    if !tags.is_empty() {
        println!("  Tags: {}", tags.join(", "));
    }
    if book.is_downloading() {
        println!("  Download: {}", book.download_id);
    }
    println!("╚═══════════════════════════════════════════════════════════════╝");

    Ok(())
}

/// Add an archive to the library
async fn open_archive(dir: &std::path::Path, path: PathBuf) -> Result<()> {
    let library = open_library(dir)?;
    let path = path.canonicalize().unwrap_or(path);

    let id = library.open_book_from_path(&path)?;
    eprintln!("✓ Added {} as {}", path.display(), id);

    Ok(())
}

/// Remove a book from the library
async fn remove_book(dir: &std::path::Path, book_id: &str) -> Result<()> {
    let library = open_library(dir)?;

    let book = library
        .remove_book_by_id(book_id)
        .ok_or_else(|| anyhow::anyhow!("Book not found: {}", book_id))?;
    library.save()?;

    eprintln!("✓ Removed {} ({})", book.title, book.id);

    Ok(())
}

fn print_report(dir: &std::path::Path, report: &crate::library::ReconcileReport) {
    println!("{}:", dir.display());
    for path in &report.added {
        println!("  + {}", path.display());
    }
    for path in &report.removed {
        println!("  - {}", path.display());
    }
    for path in &report.rejected {
        println!("  ! {} (unreadable)", path.display());
    }
    if report.is_empty() {
        println!("  (no changes)");
    }
}

/// Reconcile a directory once
async fn reconcile_dir(dir: &std::path::Path, target: PathBuf) -> Result<()> {
    let library = open_library(dir)?;
    let target = target.canonicalize().unwrap_or(target);

    let watcher = LibraryWatcher::with_config(WatcherConfig {
        dirs: vec![target],
        pattern: config::config()
            .map(|c| c.archive_pattern.clone())
            .unwrap_or_else(|_| crate::library::DEFAULT_ARCHIVE_PATTERN.to_string()),
        ..Default::default()
    });

    for change in watcher.scan_once(&library).await? {
        print_report(&change.dir, &change.report);
    }

    Ok(())
}

/// Watch monitored directories until Ctrl-C
async fn watch_dirs(dir: &std::path::Path) -> Result<()> {
    let cfg = config::config()?;
    if cfg.monitor_dirs.is_empty() {
        anyhow::bail!("No monitored directories configured (monitor.dirs in .zimshelf/config.yaml)");
    }

    let library = open_library(dir)?;
    let watcher = LibraryWatcher::with_config(WatcherConfig {
        dirs: cfg.monitor_dirs.clone(),
        debounce_ms: cfg.debounce_ms,
        pattern: cfg.archive_pattern.clone(),
    });

    for change in watcher.scan_once(&library).await? {
        print_report(&change.dir, &change.report);
    }

    let (mut changes, handle) = watcher.watch(Arc::clone(&library))?;
    eprintln!("👀 Watching {} directories (Ctrl-C to stop)", cfg.monitor_dirs.len());

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Some(change) => print_report(&change.dir, &change.report),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.stop().await?;
    library.save()?;

    Ok(())
}

/// List bookmarks
async fn list_bookmarks(dir: &std::path::Path) -> Result<()> {
    let library = open_library(dir)?;
    let bookmarks = library.bookmarks();

    if bookmarks.is_empty() {
        println!("No bookmarks.");
        return Ok(());
    }

    println!("{:<38} {:<30} {:<40}", "BOOK", "TITLE", "URL");
    println!("{}", "-".repeat(110));

    for bookmark in &bookmarks {
        println!(
            "{:<38} {:<30} {:<40}",
            bookmark.book.id,
            truncate(&bookmark.title, 30),
            bookmark.url
        );
    }

    Ok(())
}

/// Coordinator for the library, polling at the configured interval
fn download_coordinator(library: Arc<Library>, cfg: &ResolvedConfig) -> DownloadCoordinator {
    DownloadCoordinator::new(library, None).with_poll_interval(cfg.poll_interval)
}

/// List downloads the library records as in flight
async fn list_downloads(dir: &std::path::Path) -> Result<()> {
    let cfg = config::config()?;
    let library = open_library(dir)?;
    let coordinator = download_coordinator(Arc::clone(&library), cfg);

    let tracked = coordinator.tracked_books();
    if tracked.is_empty() {
        println!("No downloads in progress.");
        return Ok(());
    }

    let pending: u64 = tracked
        .iter()
        .filter_map(|id| library.book_by_id(id).ok())
        .map(|book| book.size)
        .sum();
    println!(
        "Download directory: {} (poll every {}ms)",
        cfg.downloads.display(),
        coordinator.poll_interval().as_millis()
    );
    match check_can_store(&cfg.downloads, pending, &FsSpaceProbe) {
        Ok(()) => println!("  {} pending, space ok\n", convert_to_units(pending)),
        Err(e) => println!("  {}\n", e),
    }

    println!("{:<38} {:<24} {:<40}", "BOOK", "DOWNLOAD ID", "TITLE");
    println!("{}", "-".repeat(104));

    for book_id in &tracked {
        let book = library.book_by_id(book_id)?;
        println!(
            "{:<38} {:<24} {:<40}",
            book.id,
            book.download_id,
            truncate(&book.title, 40)
        );
    }

    if !coordinator.downloading_available() {
        println!("\nNo download engine configured; downloads stay paused.");
    }

    Ok(())
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("  zimshelf Configuration");
    println!("╚═══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Library:   {}", cfg.library.display());
    println!("  Catalog:   {}", cfg.library.join(crate::library::CATALOG_FILE).display());
    println!("  Bookmarks: {}", cfg.library.join(crate::library::BOOKMARKS_FILE).display());
    println!("  Downloads: {}", cfg.downloads.display());
    println!();
    println!("Monitored directories:");
    if cfg.monitor_dirs.is_empty() {
        println!("  (none)");
    } else {
        for dir in &cfg.monitor_dirs {
            println!("  {}", dir.display());
        }
    }
    println!("  Pattern:  {}", cfg.archive_pattern);
    println!("  Debounce: {}ms", cfg.debounce_ms);
    println!();
    println!("Downloads:");
    println!("  Poll interval: {}ms", cfg.poll_interval.as_millis());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_args() {
        let cli = Cli::parse_from(["zimshelf", "list", "--lang", "eng,fra", "--sort", "size", "--desc"]);
        match cli.command {
            Commands::List { lang, sort, desc, .. } => {
                assert_eq!(lang.as_deref(), Some("eng,fra"));
                assert_eq!(sort, SortBy::Size);
                assert!(desc);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer title", 10), "a much ...");
    }

    #[test]
    fn test_truncate_narrow_width() {
        assert_eq!(truncate("abcdef", 2), "...");
        assert_eq!(truncate("abcdef", 0), "...");
        assert_eq!(truncate("", 0), "");
    }

    #[test]
    fn test_download_coordinator_uses_configured_interval() {
        let temp = tempfile::TempDir::new().unwrap();
        let cfg = ResolvedConfig {
            home: temp.path().to_path_buf(),
            library: temp.path().join("library"),
            downloads: temp.path().join("downloads"),
            monitor_dirs: Vec::new(),
            archive_pattern: crate::library::DEFAULT_ARCHIVE_PATTERN.to_string(),
            debounce_ms: 1000,
            poll_interval: std::time::Duration::from_millis(250),
            config_file: None,
        };
        let library = Library::open(&cfg.library, Arc::new(ZimHeaderEngine::new())).unwrap();

        let coordinator = download_coordinator(Arc::new(library), &cfg);
        assert_eq!(coordinator.poll_interval(), std::time::Duration::from_millis(250));
        assert!(!coordinator.downloading_available());
    }

    #[test]
    fn test_build_filter() {
        let filter = build_filter(Some("eng".to_string()), None, true);
        let local = Book::new("a", "A").with_language("eng").with_path("/zims/a.zim");
        let remote = Book::new("b", "B").with_language("eng");
        assert!(filter.accepts(&local));
        assert!(!filter.accepts(&remote));

        let everything = build_filter(None, None, false);
        assert!(everything.accepts(&remote));
    }
}
