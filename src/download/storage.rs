//! Target directory checks run before a download is started.

use std::io;
use std::path::Path;

use thiserror::Error;

/// Why a target directory cannot hold a download
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Download directory does not exist: {0}")]
    DirectoryMissing(String),

    #[error("Download directory is not writable: {0}")]
    DirectoryNotWritable(String),

    #[error("Not enough free space in {dir}: {needed} bytes needed, {available:?} available")]
    InsufficientSpace {
        dir: String,
        needed: u64,
        available: Option<u64>,
    },
}

/// Reports free space for a directory
pub trait SpaceProbe: Send + Sync {
    fn available_space(&self, dir: &Path) -> io::Result<u64>;
}

/// Free space as reported by the filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn available_space(&self, dir: &Path) -> io::Result<u64> {
        fs2::available_space(dir)
    }
}

/// Check that `dir` exists, is writable and can hold `size` bytes
pub fn check_can_store(dir: &Path, size: u64, probe: &dyn SpaceProbe) -> Result<(), StorageError> {
    let shown = dir.display().to_string();

    if !dir.is_dir() {
        return Err(StorageError::DirectoryMissing(shown));
    }

    // Permission bits lie on some platforms; try to create a file instead
    if tempfile::tempfile_in(dir).is_err() {
        return Err(StorageError::DirectoryNotWritable(shown));
    }

    let available = probe.available_space(dir).ok();
    match available {
        Some(free) if free >= size => Ok(()),
        _ => Err(StorageError::InsufficientSpace {
            dir: shown,
            needed: size,
            available,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixed(Option<u64>);

    impl SpaceProbe for Fixed {
        fn available_space(&self, _dir: &Path) -> io::Result<u64> {
            self.0
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "statvfs failed"))
        }
    }

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let err = check_can_store(&missing, 1, &Fixed(Some(10))).unwrap_err();
        assert!(matches!(err, StorageError::DirectoryMissing(_)));
    }

    #[test]
    fn test_space_checks() {
        let temp = TempDir::new().unwrap();

        assert!(check_can_store(temp.path(), 10, &Fixed(Some(10))).is_ok());

        let err = check_can_store(temp.path(), 11, &Fixed(Some(10))).unwrap_err();
        assert!(matches!(
            err,
            StorageError::InsufficientSpace { needed: 11, available: Some(10), .. }
        ));

        // Unknown free space counts as insufficient
        let err = check_can_store(temp.path(), 1, &Fixed(None)).unwrap_err();
        assert!(matches!(err, StorageError::InsufficientSpace { available: None, .. }));
    }

    #[test]
    fn test_fs_probe_reports_space() {
        let temp = TempDir::new().unwrap();
        assert!(FsSpaceProbe.available_space(temp.path()).is_ok());
    }
}
