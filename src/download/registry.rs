//! Thread-safe map from book id to the latest download snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::DownloadState;

#[derive(Debug, Default)]
pub struct DownloadRegistry {
    entries: Mutex<HashMap<String, Arc<DownloadState>>>,
}

impl DownloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a snapshot for `book_id`, replacing the previous one
    pub fn set(&self, book_id: &str, state: Arc<DownloadState>) {
        self.entries().insert(book_id.to_string(), state);
    }

    /// Replace the snapshot only if `book_id` is still tracked.
    ///
    /// A poll cycle uses this so that an entry dismissed mid-cycle stays gone.
    pub fn update(&self, book_id: &str, state: Arc<DownloadState>) -> bool {
        match self.entries().get_mut(book_id) {
            Some(slot) => {
                *slot = state;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, book_id: &str) -> Option<Arc<DownloadState>> {
        self.entries().get(book_id).cloned()
    }

    /// Drop the entry; returns whether one existed
    pub fn remove(&self, book_id: &str) -> bool {
        self.entries().remove(book_id).is_some()
    }

    pub fn contains(&self, book_id: &str) -> bool {
        self.entries().contains_key(book_id)
    }

    /// Tracked book ids, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<DownloadState>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_whole_snapshot() {
        let registry = DownloadRegistry::new();
        let first = Arc::new(DownloadState::paused_placeholder());
        registry.set("b", Arc::clone(&first));

        let second = Arc::new(DownloadState {
            progress: 50.0,
            ..DownloadState::default()
        });
        registry.set("b", second);

        // Observers holding the old snapshot still see it unchanged
        assert!(first.paused);
        assert_eq!(registry.get("b").unwrap().progress, 50.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = DownloadRegistry::new();
        registry.set("b", Arc::new(DownloadState::default()));

        assert!(registry.remove("b"));
        assert!(!registry.remove("b"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_does_not_resurrect() {
        let registry = DownloadRegistry::new();
        assert!(!registry.update("b", Arc::new(DownloadState::default())));
        assert!(!registry.contains("b"));

        registry.set("b", Arc::new(DownloadState::paused_placeholder()));
        assert!(registry.update("b", Arc::new(DownloadState::default())));
        assert!(!registry.get("b").unwrap().paused);
    }

    #[test]
    fn test_keys_sorted() {
        let registry = DownloadRegistry::new();
        registry.set("c", Arc::new(DownloadState::default()));
        registry.set("a", Arc::new(DownloadState::default()));
        assert_eq!(registry.keys(), vec!["a", "c"]);
    }
}
