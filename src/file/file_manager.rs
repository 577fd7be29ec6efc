use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{PAGE_SIZE, PageId};

/// Handle to an open paged file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

impl FileHandle {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

struct FileEntry {
    file: File,
    path: PathBuf,
}

/// Page-granular file I/O with no caching. Every read and write moves
/// exactly one page; writes extend the file when needed.
pub struct PagedFileManager {
    /// Slab of open files, indexed by handle
    open_files: Vec<Option<FileEntry>>,
    /// Map from canonical paths to handles (for re-open detection)
    path_to_handle: HashMap<PathBuf, FileHandle>,
}

impl PagedFileManager {
    pub fn new() -> Self {
        Self {
            open_files: Vec::new(),
            path_to_handle: HashMap::new(),
        }
    }

    /// Create a new empty file, along with any missing parent directories
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        File::create(path)?;
        Ok(())
    }

    /// Open an existing file. Opening a path that is already open returns
    /// the handle issued the first time.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let path_ref = path.as_ref();
        let path = path_ref
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(path_ref.display().to_string()))?;

        if let Some(&handle) = self.path_to_handle.get(&path) {
            return Ok(handle);
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let handle = FileHandle(self.open_files.len());
        self.open_files.push(Some(FileEntry {
            file,
            path: path.clone(),
        }));
        self.path_to_handle.insert(path, handle);

        Ok(handle)
    }

    /// Close a file
    pub fn close_file(&mut self, handle: FileHandle) -> FileResult<()> {
        let entry = self
            .open_files
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or(FileError::InvalidHandle(handle.0))?;
        self.path_to_handle.remove(&entry.path);
        Ok(())
    }

    /// Remove (delete) a file, closing it first if it is open
    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();
        if let Ok(canonical) = path.canonicalize() {
            if let Some(&handle) = self.path_to_handle.get(&canonical) {
                self.close_file(handle)?;
            }
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn entry_mut(&mut self, handle: FileHandle) -> FileResult<&mut FileEntry> {
        self.open_files
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(FileError::InvalidHandle(handle.0))
    }

    /// Read one page into `buffer`. Bytes past the current end of file
    /// read as zero; callers are expected to only read pages they have
    /// allocated themselves.
    pub fn read_page(
        &mut self,
        handle: FileHandle,
        page_id: PageId,
        buffer: &mut [u8],
    ) -> FileResult<()> {
        debug_assert_eq!(buffer.len(), PAGE_SIZE);

        let entry = self.entry_mut(handle)?;
        let offset = (page_id * PAGE_SIZE) as u64;
        entry.file.seek(SeekFrom::Start(offset))?;

        let mut read = 0;
        while read < PAGE_SIZE {
            let n = entry.file.read(&mut buffer[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        if read < PAGE_SIZE {
            buffer[read..].fill(0);
        }
        Ok(())
    }

    /// Write one page at its offset, extending the file if `page_id` is
    /// past the current end
    pub fn write_page(
        &mut self,
        handle: FileHandle,
        page_id: PageId,
        buffer: &[u8],
    ) -> FileResult<()> {
        debug_assert_eq!(buffer.len(), PAGE_SIZE);

        let entry = self.entry_mut(handle)?;
        let offset = (page_id * PAGE_SIZE) as u64;

        let required = offset + PAGE_SIZE as u64;
        if entry.file.metadata()?.len() < required {
            entry.file.set_len(required)?;
        }

        entry.file.seek(SeekFrom::Start(offset))?;
        entry.file.write_all(buffer)?;
        Ok(())
    }

    /// Number of pages currently in the file
    pub fn page_count(&mut self, handle: FileHandle) -> FileResult<usize> {
        let entry = self.entry_mut(handle)?;
        let len = entry.file.metadata()?.len();
        Ok(len.div_ceil(PAGE_SIZE as u64) as usize)
    }

    /// Flush OS buffers for every open file
    pub fn sync_all(&mut self) -> FileResult<()> {
        for entry in self.open_files.iter_mut().flatten() {
            entry.file.sync_data()?;
        }
        Ok(())
    }

    pub fn is_file_open(&self, handle: FileHandle) -> bool {
        self.open_files
            .get(handle.0)
            .is_some_and(Option::is_some)
    }
}

impl Default for PagedFileManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_create_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        assert!(manager.create_file(&test_file).is_ok());
        assert!(test_file.exists());
    }

    #[test]
    fn test_create_file_already_exists() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let result = manager.create_file(&test_file);
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_open_close_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();
        assert!(manager.is_file_open(handle));

        manager.close_file(handle).unwrap();
        assert!(!manager.is_file_open(handle));
    }

    #[test]
    fn test_open_nonexistent_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("nope.db");
        let mut manager = PagedFileManager::new();

        let result = manager.open_file(&test_file);
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_open_same_file_twice() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle1 = manager.open_file(&test_file).unwrap();
        let handle2 = manager.open_file(&test_file).unwrap();
        assert_eq!(handle1, handle2);
    }

    #[test]
    fn test_read_write_page() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();

        let mut write_buffer = vec![0u8; PAGE_SIZE];
        write_buffer[0] = 42;
        write_buffer[PAGE_SIZE - 1] = 255;
        manager.write_page(handle, 0, &write_buffer).unwrap();

        let mut read_buffer = vec![0u8; PAGE_SIZE];
        manager.read_page(handle, 0, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, write_buffer);
    }

    #[test]
    fn test_write_extends_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();
        assert_eq!(manager.page_count(handle).unwrap(), 0);

        let buffer = vec![7u8; PAGE_SIZE];
        manager.write_page(handle, 0, &buffer).unwrap();
        assert_eq!(manager.page_count(handle).unwrap(), 1);

        manager.write_page(handle, 3, &buffer).unwrap();
        assert_eq!(manager.page_count(handle).unwrap(), 4);
    }

    #[test]
    fn test_read_past_end_is_zero() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();

        let mut buffer = vec![9u8; PAGE_SIZE];
        manager.read_page(handle, 10, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_remove_open_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();

        manager.remove_file(&test_file).unwrap();
        assert!(!test_file.exists());
        assert!(!manager.is_file_open(handle));
    }
}
