mod buffer_manager;
mod error;
mod file_manager;
mod frame_bitmap;

pub use buffer_manager::BufferManager;
pub use error::{FileError, FileResult};
pub use file_manager::{FileHandle, PagedFileManager};
pub use frame_bitmap::FrameBitmap;

/// Page size in bytes (8KB)
pub const PAGE_SIZE: usize = 8192;

/// Default number of frames in the buffer pool (1024 × 8KB = 8MB)
pub const BUFFER_POOL_SIZE: usize = 1024;

/// Page ID type
pub type PageId = usize;
