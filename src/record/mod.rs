mod error;
mod heap_file;
mod record;
mod schema;
mod slot;

pub use error::{RecordError, RecordResult};
pub use heap_file::{HeapFile, RecordCursor};
pub use record::{Record, RecordId, SlotId};
pub use schema::RecordSchema;
pub use slot::SlotEntry;

use crate::file::PAGE_SIZE;

/// Upper bound on slots per page; the factor in the integer locator
/// encoding `page * PAGE_SLOT_CAPACITY + slot`. One slot directory
/// entry is two bytes, so a page can never hold more entries than this.
pub const PAGE_SLOT_CAPACITY: usize = PAGE_SIZE / 2;
