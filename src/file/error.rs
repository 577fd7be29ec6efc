use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(usize),

    #[error("Page not cached: page_id={0}")]
    PageNotCached(usize),

    #[error("No evictable frame in buffer pool")]
    BufferPoolFull,
}

pub type FileResult<T> = Result<T, FileError>;
