//! Monitored directory bookkeeping.
//!
//! For each watched directory we remember the archive paths seen on the last
//! pass. The next pass diffs a fresh listing against that set.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::Serialize;

/// Archive paths last observed per monitored directory
#[derive(Debug, Clone, Default)]
pub struct MonitoredDirs {
    dirs: HashMap<PathBuf, BTreeSet<PathBuf>>,
}

impl MonitoredDirs {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded set for `dir` (empty if never recorded)
    pub fn get(&self, dir: &Path) -> BTreeSet<PathBuf> {
        self.dirs.get(dir).cloned().unwrap_or_default()
    }

    /// Replace the recorded set for `dir`
    pub fn replace(&mut self, dir: &Path, paths: BTreeSet<PathBuf>) {
        self.dirs.insert(dir.to_path_buf(), paths);
    }

    /// Directories with a recorded set
    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.dirs.keys().map(PathBuf::as_path)
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Paths present now but not on the previous pass
    pub added: BTreeSet<PathBuf>,

    /// Paths present on the previous pass but gone now
    pub removed: BTreeSet<PathBuf>,

    /// Added paths the archive engine could not read
    pub rejected: BTreeSet<PathBuf>,
}

impl ReconcileReport {
    /// Whether the pass changed anything
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Set difference both ways: (current - previous, previous - current)
pub fn diff(
    previous: &BTreeSet<PathBuf>,
    current: &BTreeSet<PathBuf>,
) -> (BTreeSet<PathBuf>, BTreeSet<PathBuf>) {
    let added = current.difference(previous).cloned().collect();
    let removed = previous.difference(current).cloned().collect();
    (added, removed)
}

/// List the files directly in `dir` whose name matches `pattern`
pub fn scan_archives(dir: &Path, pattern: &Pattern) -> std::io::Result<BTreeSet<PathBuf>> {
    let mut found = BTreeSet::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| pattern.matches(n))
            .unwrap_or(false);
        if !matches {
            continue;
        }

        // Skip files that vanished or are not regular files
        match entry.metadata() {
            Ok(m) if m.is_file() => {
                found.insert(dir.join(entry.file_name()));
            }
            _ => continue,
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_diff_both_ways() {
        let previous = set(&["a", "b", "c"]);
        let current = set(&["a", "c", "d"]);

        let (added, removed) = diff(&previous, &current);
        assert_eq!(added, set(&["d"]));
        assert_eq!(removed, set(&["b"]));
    }

    #[test]
    fn test_scan_archives_matches_pattern_only() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("one.zim"), b"x").unwrap();
        std::fs::write(temp.path().join("two.zim"), b"x").unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("dir.zim")).unwrap();

        let pattern = Pattern::new("*.zim").unwrap();
        let found = scan_archives(temp.path(), &pattern).unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.contains(&temp.path().join("one.zim")));
        assert!(found.contains(&temp.path().join("two.zim")));
    }

    #[test]
    fn test_monitored_dirs_replace() {
        let mut monitored = MonitoredDirs::new();
        let dir = Path::new("/zims");
        assert!(monitored.get(dir).is_empty());

        monitored.replace(dir, set(&["/zims/a.zim"]));
        assert_eq!(monitored.get(dir), set(&["/zims/a.zim"]));
        assert_eq!(monitored.dirs().count(), 1);
    }
}
