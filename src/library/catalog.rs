//! Catalog of all known books.
//!
//! Persisted as `library.xml`: a `<library>` root holding one attribute-only
//! `<book/>` element per book.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::LibraryError;
use crate::domain::Book;

/// Format version written to the `<library>` root
pub const CATALOG_VERSION: &str = "20110515";

/// On-disk shape of `library.xml`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "library")]
struct CatalogFile {
    #[serde(rename = "@version", default)]
    version: String,

    #[serde(rename = "book", default)]
    books: Vec<Book>,
}

/// In-memory catalog keyed by book id
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    books: BTreeMap<String, Book>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `library.xml` content
    pub fn from_xml(xml: &str, origin: &Path) -> Result<Self, LibraryError> {
        let file: CatalogFile = quick_xml::de::from_str(xml).map_err(|e| LibraryError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut catalog = Self::new();
        for book in file.books {
            catalog.add(book);
        }
        Ok(catalog)
    }

    /// Render `library.xml` content
    pub fn to_xml(&self) -> Result<String, LibraryError> {
        let file = CatalogFile {
            version: CATALOG_VERSION.to_string(),
            books: self.books.values().cloned().collect(),
        };
        let body = quick_xml::se::to_string(&file).map_err(|e| LibraryError::Serialize(e.to_string()))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n", body))
    }

    /// Add a book, replacing any book with the same id.
    ///
    /// Returns true if the id was not present before.
    pub fn add(&mut self, book: Book) -> bool {
        self.books.insert(book.id.clone(), book).is_none()
    }

    /// Get a book by id
    pub fn get(&self, id: &str) -> Option<&Book> {
        self.books.get(id)
    }

    /// Get a mutable book by id
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Book> {
        self.books.get_mut(id)
    }

    /// Find the book stored at exactly `path`
    pub fn get_by_path(&self, path: &Path) -> Option<&Book> {
        self.books.values().find(|b| b.path.as_deref() == Some(path))
    }

    /// Remove a book by id
    pub fn remove(&mut self, id: &str) -> Option<Book> {
        self.books.remove(id)
    }

    /// All book ids, in id order
    pub fn ids(&self) -> Vec<String> {
        self.books.keys().cloned().collect()
    }

    /// All books, in id order
    pub fn books(&self) -> impl Iterator<Item = &Book> {
        self.books.values()
    }

    /// Ids of the books matching `filter`, sorted by `sort_by`
    pub fn filter_ids(&self, filter: &BookFilter, sort_by: SortBy, ascending: bool) -> Vec<String> {
        let mut matching: Vec<&Book> = self.books.values().filter(|b| filter.accepts(b)).collect();

        if sort_by != SortBy::Unsorted {
            matching.sort_by(|a, b| {
                let ord = sort_by.compare(a, b);
                let ord = if ascending { ord } else { ord.reverse() };
                ord.then_with(|| a.id.cmp(&b.id))
            });
        }

        matching.into_iter().map(|b| b.id.clone()).collect()
    }

    /// Get the number of books
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Check if the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

/// Sort key for book listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Id order
    #[default]
    Unsorted,
    Title,
    Size,
    Date,
    Creator,
    Publisher,
}

impl SortBy {
    fn compare(self, a: &Book, b: &Book) -> Ordering {
        match self {
            SortBy::Unsorted => Ordering::Equal,
            SortBy::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortBy::Size => a.size.cmp(&b.size),
            SortBy::Date => a.published_on().cmp(&b.published_on()),
            SortBy::Creator => a.creator.to_lowercase().cmp(&b.creator.to_lowercase()),
            SortBy::Publisher => a.publisher.to_lowercase().cmp(&b.publisher.to_lowercase()),
        }
    }
}

impl std::str::FromStr for SortBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "unsorted" => Ok(SortBy::Unsorted),
            "title" => Ok(SortBy::Title),
            "size" => Ok(SortBy::Size),
            "date" => Ok(SortBy::Date),
            "creator" => Ok(SortBy::Creator),
            "publisher" => Ok(SortBy::Publisher),
            _ => anyhow::bail!("Unknown sort key: {}", s),
        }
    }
}

/// Criteria for listing books. An empty filter accepts everything.
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    /// Some(true): only books with a local path; Some(false): only remote ones
    pub local: Option<bool>,

    /// Case-insensitive substring of title or description
    pub query: Option<String>,

    pub language: Option<String>,
    pub creator: Option<String>,
    pub publisher: Option<String>,
    pub name: Option<String>,

    /// Every tag listed here must be present
    pub accept_tags: Vec<String>,

    /// No tag listed here may be present
    pub reject_tags: Vec<String>,

    /// Upper bound on size in bytes
    pub max_size: Option<u64>,
}

impl BookFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(mut self, local: bool) -> Self {
        self.local = Some(local);
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn accept_tag(mut self, tag: impl Into<String>) -> Self {
        self.accept_tags.push(tag.into());
        self
    }

    pub fn reject_tag(mut self, tag: impl Into<String>) -> Self {
        self.reject_tags.push(tag.into());
        self
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Whether `book` passes every criterion
    pub fn accepts(&self, book: &Book) -> bool {
        if let Some(local) = self.local {
            if book.path.is_some() != local {
                return false;
            }
        }

        if let Some(query) = &self.query {
            let query = query.to_lowercase();
            if !book.title.to_lowercase().contains(&query)
                && !book.description.to_lowercase().contains(&query)
            {
                return false;
            }
        }

        if let Some(language) = &self.language {
            let wanted: Vec<&str> = language.split(',').map(str::trim).collect();
            if !book.language.split(',').any(|l| wanted.contains(&l.trim())) {
                return false;
            }
        }

        if self.creator.as_ref().is_some_and(|c| c != &book.creator)
            || self.publisher.as_ref().is_some_and(|p| p != &book.publisher)
            || self.name.as_ref().is_some_and(|n| n != &book.name)
        {
            return false;
        }

        let tags: Vec<&str> = book.tag_list().collect();
        if !self.accept_tags.iter().all(|t| tags.contains(&t.as_str())) {
            return false;
        }
        if self.reject_tags.iter().any(|t| tags.contains(&t.as_str())) {
            return false;
        }

        if let Some(max_size) = self.max_size {
            if book.size > max_size {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add(
            Book::new("wp-en", "Wikipedia")
                .with_language("eng")
                .with_size(90_000)
                .with_date("2024-01-01")
                .with_tags(["wikipedia", "_pictures:yes"])
                .with_path("/zims/wikipedia_en.zim"),
        );
        catalog.add(
            Book::new("wp-fr", "Wikipédia")
                .with_language("fra")
                .with_size(50_000)
                .with_date("2023-06-01")
                .with_tags(["wikipedia", "_pictures:no"]),
        );
        catalog.add(
            Book::new("gutenberg", "Project Gutenberg")
                .with_language("eng,fra")
                .with_size(70_000)
                .with_date("2022-11-15")
                .with_tags(["gutenberg"])
                .with_path("/zims/gutenberg.zim"),
        );
        catalog
    }

    #[test]
    fn test_catalog_add_replaces_same_id() {
        let mut catalog = Catalog::new();
        assert!(catalog.add(Book::new("a", "First")));
        assert!(!catalog.add(Book::new("a", "Second")));

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("a").unwrap().title, "Second");
    }

    #[test]
    fn test_catalog_get_by_path() {
        let catalog = sample_catalog();
        let book = catalog.get_by_path(Path::new("/zims/gutenberg.zim")).unwrap();
        assert_eq!(book.id, "gutenberg");
        assert!(catalog.get_by_path(&PathBuf::from("/zims/other.zim")).is_none());
    }

    #[test]
    fn test_filter_by_language_and_locality() {
        let catalog = sample_catalog();

        let eng = catalog.filter_ids(&BookFilter::new().language("eng"), SortBy::Unsorted, true);
        assert_eq!(eng, vec!["gutenberg", "wp-en"]);

        let remote = catalog.filter_ids(&BookFilter::new().local(false), SortBy::Unsorted, true);
        assert_eq!(remote, vec!["wp-fr"]);
    }

    #[test]
    fn test_filter_by_tags_query_and_size() {
        let catalog = sample_catalog();

        let filter = BookFilter::new().accept_tag("wikipedia").reject_tag("_pictures:no");
        assert_eq!(catalog.filter_ids(&filter, SortBy::Unsorted, true), vec!["wp-en"]);

        let filter = BookFilter::new().query("GUTEN");
        assert_eq!(catalog.filter_ids(&filter, SortBy::Unsorted, true), vec!["gutenberg"]);

        let filter = BookFilter::new().max_size(70_000);
        assert_eq!(catalog.filter_ids(&filter, SortBy::Unsorted, true), vec!["gutenberg", "wp-fr"]);
    }

    #[test]
    fn test_sort_ascending_and_descending() {
        let catalog = sample_catalog();
        let all = BookFilter::new();

        assert_eq!(
            catalog.filter_ids(&all, SortBy::Size, true),
            vec!["wp-fr", "gutenberg", "wp-en"]
        );
        assert_eq!(
            catalog.filter_ids(&all, SortBy::Date, false),
            vec!["wp-en", "wp-fr", "gutenberg"]
        );
        assert_eq!(
            catalog.filter_ids(&all, SortBy::Title, true),
            vec!["gutenberg", "wp-en", "wp-fr"]
        );
    }

    #[test]
    fn test_xml_keeps_books_and_download_ids() {
        let mut catalog = sample_catalog();
        catalog.add(Book::new("pending", "Pending").with_download_id("abc123"));

        let xml = catalog.to_xml().unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("downloadId=\"abc123\""));

        let parsed = Catalog::from_xml(&xml, Path::new("library.xml")).unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed.get("pending").unwrap().download_id, "abc123");
        assert_eq!(
            parsed.get("wp-en").unwrap().path,
            Some(PathBuf::from("/zims/wikipedia_en.zim"))
        );
        assert!(parsed.get("wp-fr").unwrap().path.is_none());
    }

    #[test]
    fn test_parse_empty_library() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?><library version="20110515"/>"#;
        let catalog = Catalog::from_xml(xml, Path::new("library.xml")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_sort_by_from_str() {
        assert_eq!("Title".parse::<SortBy>().unwrap(), SortBy::Title);
        assert!("colour".parse::<SortBy>().is_err());
    }
}
