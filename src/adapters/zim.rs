//! Header-only ZIM engine.
//!
//! Reads the fixed 80-byte ZIM header to identify a file and register it as a
//! book. Content access and search need the native library, so readers are
//! not supported here.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use super::{ArchiveEngine, ArchiveError, ArchiveReader};
use crate::domain::Book;

/// "ZIM\x04" read as a little-endian u32
pub const ZIM_MAGIC: u32 = 72_173_914;

const HEADER_LEN: usize = 80;

/// Fields of the ZIM header this crate cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZimHeader {
    pub major_version: u16,
    pub minor_version: u16,
    pub uuid: Uuid,
    pub entry_count: u32,
}

impl ZimHeader {
    /// Parse the header bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("header too short ({} bytes)", bytes.len()));
        }

        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != ZIM_MAGIC {
            return Err(format!("bad magic number {:#010x}", magic));
        }

        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&bytes[8..24]);
        let uuid = Uuid::from_bytes(uuid);
        if uuid.is_nil() {
            return Err("nil archive uuid".to_string());
        }

        Ok(Self {
            major_version: u16::from_le_bytes([bytes[4], bytes[5]]),
            minor_version: u16::from_le_bytes([bytes[6], bytes[7]]),
            uuid,
            entry_count: u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
        })
    }
}

/// Archive engine that only understands the ZIM header
#[derive(Debug, Clone, Default)]
pub struct ZimHeaderEngine;

impl ZimHeaderEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveEngine for ZimHeaderEngine {
    fn read_book(&self, path: &Path) -> Result<Book, ArchiveError> {
        let invalid = |reason: String| ArchiveError::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        let mut bytes = [0u8; HEADER_LEN];
        file.read_exact(&mut bytes)
            .map_err(|e| invalid(format!("cannot read header: {}", e)))?;
        let header = ZimHeader::parse(&bytes).map_err(invalid)?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut book = Book::new(header.uuid.to_string(), stem.clone())
            .with_path(path)
            .with_size(size);
        book.name = stem;
        book.article_count = u64::from(header.entry_count);

        Ok(book)
    }

    fn open_reader(&self, _book: &Book) -> Result<Arc<dyn ArchiveReader>, ArchiveError> {
        Err(ArchiveError::Unsupported("content readers"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn header_bytes(uuid: [u8; 16], entries: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&ZIM_MAGIC.to_le_bytes());
        bytes[4..6].copy_from_slice(&6u16.to_le_bytes());
        bytes[6..8].copy_from_slice(&1u16.to_le_bytes());
        bytes[8..24].copy_from_slice(&uuid);
        bytes[24..28].copy_from_slice(&entries.to_le_bytes());
        bytes
    }

    #[test]
    fn test_parse_header() {
        let header = ZimHeader::parse(&header_bytes([7u8; 16], 42)).unwrap();
        assert_eq!(header.major_version, 6);
        assert_eq!(header.minor_version, 1);
        assert_eq!(header.entry_count, 42);
        assert_eq!(header.uuid, Uuid::from_bytes([7u8; 16]));
    }

    #[test]
    fn test_parse_rejects_bad_magic_and_nil_uuid() {
        let mut bytes = header_bytes([7u8; 16], 1);
        bytes[0] = 0;
        assert!(ZimHeader::parse(&bytes).is_err());

        assert!(ZimHeader::parse(&header_bytes([0u8; 16], 1)).is_err());
        assert!(ZimHeader::parse(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_read_book_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wikipedia_en_top.zim");
        std::fs::write(&path, header_bytes([3u8; 16], 12)).unwrap();

        let book = ZimHeaderEngine::new().read_book(&path).unwrap();
        assert_eq!(book.id, Uuid::from_bytes([3u8; 16]).to_string());
        assert_eq!(book.title, "wikipedia_en_top");
        assert_eq!(book.path.as_deref(), Some(path.as_path()));
        assert_eq!(book.size, HEADER_LEN as u64);
        assert_eq!(book.article_count, 12);
    }

    #[test]
    fn test_read_book_rejects_non_zim() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.zim");
        std::fs::write(&path, b"plain text").unwrap();

        let err = ZimHeaderEngine::new().read_book(&path).unwrap_err();
        assert!(matches!(err, ArchiveError::Invalid { .. }));
    }
}
