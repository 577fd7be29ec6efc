//! Disk-backed B+Tree index over fixed-width integer key tuples

mod btree;
mod cursor;
mod error;

pub use btree::BTreeIndex;
pub use cursor::IndexCursor;
pub use error::{IndexError, IndexResult};
