//! Disk managers for page-level I/O.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{OxbowError, Result};
use crate::storage::page::{PageId, PAGE_SIZE};

/// Backend for reading and writing fixed-size pages by page id.
///
/// The disk scheduler owns its disk manager on a worker thread, so
/// implementations only need `&mut self` access and `Send`.
pub trait DiskManager: Send + 'static {
    /// Reads the page into `buf` (exactly [`PAGE_SIZE`] bytes).
    ///
    /// Pages that have never been written read back as zeroes.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()>;

    /// Writes the page from `buf` (exactly [`PAGE_SIZE`] bytes).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()>;

    /// Flushes outstanding writes and releases resources.
    fn shutdown(&mut self) {}
}

/// File-backed disk manager.
///
/// Pages live at `page_id * PAGE_SIZE` within a single database file. Reads
/// past the current end of file return zeroed pages, so freshly allocated
/// page ids are readable before their first write.
pub struct FileDiskManager {
    /// Path to the database file.
    path: PathBuf,
    /// File handle for the database file.
    file: File,
}

impl FileDiskManager {
    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| OxbowError::StorageError(format!("Failed to open database file: {e}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Returns the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the size of the database file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    pub fn file_size(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| OxbowError::StorageError(format!("Failed to get file size: {e}")))
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        debug_assert!(page_id.is_valid());
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        self.file
            .seek(SeekFrom::Start(page_id.offset()))
            .map_err(|e| OxbowError::StorageError(format!("Failed to seek to page: {e}")))?;

        match self.file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Page beyond current file size: it has never been written.
                buf.fill(0);
                Ok(())
            }
            Err(e) => Err(OxbowError::StorageError(format!(
                "Failed to read page {page_id}: {e}"
            ))),
        }
    }

    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()> {
        debug_assert!(page_id.is_valid());
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        self.file
            .seek(SeekFrom::Start(page_id.offset()))
            .map_err(|e| OxbowError::StorageError(format!("Failed to seek to page: {e}")))?;

        self.file
            .write_all(buf)
            .map_err(|e| OxbowError::StorageError(format!("Failed to write page {page_id}: {e}")))
    }

    fn shutdown(&mut self) {
        let _ = self.file.sync_all();
    }
}

/// Memory-backed disk manager with unlimited capacity.
///
/// Used by tests that exercise buffer pool and index behaviour without
/// touching the filesystem. Pages that were never written read as zeroes.
#[derive(Default)]
pub struct MemoryDiskManager {
    pages: HashMap<PageId, Box<[u8; PAGE_SIZE]>>,
}

impl MemoryDiskManager {
    /// Creates an empty in-memory backing store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of pages that have been written at least once.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        debug_assert!(page_id.is_valid());
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        match self.pages.get(&page_id) {
            Some(page) => buf.copy_from_slice(&page[..]),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()> {
        debug_assert!(page_id.is_valid());
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        let page = self
            .pages
            .entry(page_id)
            .or_insert_with(|| Box::new([0u8; PAGE_SIZE]));
        page.copy_from_slice(buf);
        Ok(())
    }
}
