use lru::LruCache;
use std::num::NonZeroUsize;

use super::error::{FileError, FileResult};
use super::file_manager::{FileHandle, PagedFileManager};
use super::frame_bitmap::FrameBitmap;
use super::{BUFFER_POOL_SIZE, PAGE_SIZE, PageId};

/// A key identifying a page in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BufferKey {
    file: FileHandle,
    page_id: PageId,
}

/// One in-memory frame. The page bytes are allocated lazily the first
/// time the frame is occupied and reused for the rest of the pool's life.
struct Frame {
    data: Vec<u8>,
    dirty: bool,
}

impl Frame {
    fn empty() -> Self {
        Self {
            data: Vec::new(),
            dirty: false,
        }
    }
}

/// Process-wide page cache over a fixed set of frames.
///
/// One `BufferManager` is created at startup and passed by `&mut`
/// reference into every record store and index operation; all of them
/// observe the same cache. A returned page slice is only valid until
/// the next call on the pool, which may recycle the frame behind it.
///
/// `get_page_mut` and `alloc_page` mark the frame dirty themselves, so
/// mutation sites cannot forget the write-back flag.
pub struct BufferManager {
    file_manager: PagedFileManager,
    /// Frame storage; `lru` maps resident pages to indices in here
    frames: Vec<Frame>,
    /// One bit per frame, set while the frame is free
    free_frames: FrameBitmap,
    /// Resident-page table doubling as the eviction order
    lru: LruCache<BufferKey, usize>,
}

impl BufferManager {
    pub fn new(file_manager: PagedFileManager) -> Self {
        Self::with_capacity(file_manager, BUFFER_POOL_SIZE)
    }

    pub fn with_capacity(file_manager: PagedFileManager, capacity: usize) -> Self {
        assert!(capacity > 0, "buffer pool needs at least one frame");
        Self {
            file_manager,
            frames: (0..capacity).map(|_| Frame::empty()).collect(),
            free_frames: FrameBitmap::new(capacity, true),
            lru: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
        }
    }

    pub fn file_manager(&self) -> &PagedFileManager {
        &self.file_manager
    }

    pub fn file_manager_mut(&mut self) -> &mut PagedFileManager {
        &mut self.file_manager
    }

    /// Borrow a page read-only, loading it from disk if necessary
    pub fn get_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<&[u8]> {
        let idx = self.fetch(BufferKey { file, page_id }, true, false)?;
        Ok(&self.frames[idx].data)
    }

    /// Borrow a page for mutation, loading it if necessary.
    /// The frame is marked dirty.
    pub fn get_page_mut(&mut self, file: FileHandle, page_id: PageId) -> FileResult<&mut [u8]> {
        let idx = self.fetch(BufferKey { file, page_id }, true, true)?;
        Ok(&mut self.frames[idx].data)
    }

    /// Borrow a zeroed frame for a page that does not exist on disk yet.
    /// Nothing is read; the frame is marked dirty so the page gets
    /// materialized on the next flush or eviction.
    pub fn alloc_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<&mut [u8]> {
        let idx = self.fetch(BufferKey { file, page_id }, false, true)?;
        Ok(&mut self.frames[idx].data)
    }

    /// Flag a cached page for write-back
    pub fn mark_dirty(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let key = BufferKey { file, page_id };
        let &idx = self.lru.get(&key).ok_or(FileError::PageNotCached(page_id))?;
        self.frames[idx].dirty = true;
        Ok(())
    }

    /// Write a page back to disk if it is cached and dirty
    pub fn flush_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let key = BufferKey { file, page_id };
        if let Some(&idx) = self.lru.peek(&key) {
            if self.frames[idx].dirty {
                self.file_manager
                    .write_page(file, page_id, &self.frames[idx].data)?;
                self.frames[idx].dirty = false;
            }
        }
        Ok(())
    }

    /// Write every dirty frame back and sync the underlying files.
    /// Frames stay resident.
    pub fn flush_all(&mut self) -> FileResult<()> {
        let dirty: Vec<(BufferKey, usize)> = self
            .lru
            .iter()
            .filter(|&(_, &idx)| self.frames[idx].dirty)
            .map(|(key, &idx)| (*key, idx))
            .collect();

        for (key, idx) in dirty {
            self.file_manager
                .write_page(key.file, key.page_id, &self.frames[idx].data)?;
            self.frames[idx].dirty = false;
        }

        self.file_manager.sync_all()?;
        Ok(())
    }

    /// Flush everything and drop all cached pages
    pub fn flush_and_clear(&mut self) -> FileResult<()> {
        self.flush_all()?;
        while let Some((_, idx)) = self.lru.pop_lru() {
            self.free_frames.set(idx, true);
        }
        Ok(())
    }

    /// Drop one page from the cache, flushing it first if dirty
    pub fn evict_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let key = BufferKey { file, page_id };
        if self.lru.peek(&key).is_some() {
            self.flush_page(file, page_id)?;
            if let Some(idx) = self.lru.pop(&key) {
                self.free_frames.set(idx, true);
            }
        }
        Ok(())
    }

    pub fn cached_page_count(&self) -> usize {
        self.lru.len()
    }

    pub fn dirty_page_count(&self) -> usize {
        self.lru
            .iter()
            .filter(|&(_, &idx)| self.frames[idx].dirty)
            .count()
    }

    pub fn is_page_cached(&self, file: FileHandle, page_id: PageId) -> bool {
        self.lru.contains(&BufferKey { file, page_id })
    }

    /// Resolve a key to a resident frame, grabbing and filling one if
    /// the page is not cached
    fn fetch(&mut self, key: BufferKey, read_from_disk: bool, dirty: bool) -> FileResult<usize> {
        if let Some(&idx) = self.lru.get(&key) {
            if !read_from_disk {
                // alloc on an already-cached page resets its contents
                self.frames[idx].data.fill(0);
            }
            if dirty {
                self.frames[idx].dirty = true;
            }
            return Ok(idx);
        }

        let idx = self.grab_frame()?;

        if self.frames[idx].data.len() != PAGE_SIZE {
            self.frames[idx].data = vec![0u8; PAGE_SIZE];
        }
        if read_from_disk {
            self.file_manager
                .read_page(key.file, key.page_id, &mut self.frames[idx].data)?;
        } else {
            self.frames[idx].data.fill(0);
        }

        self.frames[idx].dirty = dirty;
        self.free_frames.set(idx, false);
        self.lru.put(key, idx);
        Ok(idx)
    }

    /// Pick a frame to fill: lowest free frame first, then the least
    /// recently used resident page (flushed first if dirty)
    fn grab_frame(&mut self) -> FileResult<usize> {
        if let Some(idx) = self.free_frames.find_first_set() {
            return Ok(idx);
        }

        let (victim, idx) = self.lru.pop_lru().ok_or(FileError::BufferPoolFull)?;
        if self.frames[idx].dirty {
            self.file_manager
                .write_page(victim.file, victim.page_id, &self.frames[idx].data)?;
            self.frames[idx].dirty = false;
        }
        Ok(idx)
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        let _ = self.flush_all();
    }
}
