//! Single-process storage core: a paged file layer with an LRU buffer
//! pool, a slotted-page heap record store, and a disk-backed B+Tree
//! index over fixed-width integer keys.

pub mod file;
pub mod index;
pub mod record;

pub use file::{
    BUFFER_POOL_SIZE, BufferManager, FileError, FileHandle, FileResult, PAGE_SIZE, PageId,
    PagedFileManager,
};
pub use index::{BTreeIndex, IndexCursor, IndexError, IndexResult};
pub use record::{
    HeapFile, PAGE_SLOT_CAPACITY, Record, RecordCursor, RecordError, RecordId, RecordResult,
    RecordSchema, SlotEntry, SlotId,
};
