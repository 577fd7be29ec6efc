use crate::file::FileError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid slot: page_id={0}, slot_id={1}")]
    InvalidSlot(usize, usize),

    #[error("Record of {0} bytes does not fit in an empty page")]
    RecordTooLarge(usize),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
}

pub type RecordResult<T> = Result<T, RecordError>;
