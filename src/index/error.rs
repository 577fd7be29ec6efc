use crate::file::FileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Cursor is at end")]
    CursorAtEnd,
}

pub type IndexResult<T> = Result<T, IndexError>;
