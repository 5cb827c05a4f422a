//! Search across one or more opened archives.

use std::sync::Arc;

use crate::adapters::{ArchiveError, ArchiveReader, SearchHit};

/// Fans a query out to a group of readers and merges the hits by score
pub struct Searcher {
    readers: Vec<Arc<dyn ArchiveReader>>,
}

impl Searcher {
    pub fn new(readers: Vec<Arc<dyn ArchiveReader>>) -> Self {
        Self { readers }
    }

    /// Books covered by this searcher
    pub fn book_ids(&self) -> Vec<&str> {
        self.readers.iter().map(|r| r.book_id()).collect()
    }

    /// Search every reader and keep the best `limit` hits overall
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ArchiveError> {
        let mut hits = Vec::new();
        for reader in &self.readers {
            hits.extend(reader.search(query, limit)?);
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

impl std::fmt::Debug for Searcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searcher")
            .field("books", &self.book_ids())
            .finish()
    }
}
