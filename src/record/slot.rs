use crate::file::PAGE_SIZE;

const TAG_SHIFT: u16 = 14;
const OFFSET_MASK: u16 = (1 << TAG_SHIFT) - 1;

const TAG_NORMAL: u16 = 0b00;
const TAG_CONTINUATION: u16 = 0b01;
const TAG_TOMBSTONE: u16 = 0b10;
const TAG_END_OF_FILE: u16 = 0b11;

/// One slot directory entry: a 16-bit word whose top two bits tag the
/// slot's state and whose low 14 bits hold the payload offset when the
/// tag carries one.
///
/// `Tombstoned` keeps the dead record's offset: the update fit check
/// bounds a record by the next slot's recorded offset, and that next
/// slot may well be a tombstone. `EndOfFile` serializes to `0xFFFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEntry {
    /// Live record starting at the given payload offset
    Normal(u16),
    /// The page is full; the heap continues on the next page
    Continuation,
    /// Deleted record; the offset marks its dead payload
    Tombstoned(u16),
    /// No slots follow, anywhere in the file
    EndOfFile,
}

impl SlotEntry {
    pub fn encode(self) -> u16 {
        match self {
            SlotEntry::Normal(offset) => {
                debug_assert!(offset <= OFFSET_MASK);
                offset
            }
            SlotEntry::Continuation => TAG_CONTINUATION << TAG_SHIFT,
            SlotEntry::Tombstoned(offset) => {
                debug_assert!(offset <= OFFSET_MASK);
                (TAG_TOMBSTONE << TAG_SHIFT) | offset
            }
            SlotEntry::EndOfFile => (TAG_END_OF_FILE << TAG_SHIFT) | OFFSET_MASK,
        }
    }

    pub fn decode(raw: u16) -> Self {
        let offset = raw & OFFSET_MASK;
        match raw >> TAG_SHIFT {
            TAG_NORMAL => SlotEntry::Normal(offset),
            TAG_CONTINUATION => SlotEntry::Continuation,
            TAG_TOMBSTONE => SlotEntry::Tombstoned(offset),
            _ => SlotEntry::EndOfFile,
        }
    }

    /// Payload offset for the variants that record one
    pub fn offset(self) -> Option<u16> {
        match self {
            SlotEntry::Normal(offset) | SlotEntry::Tombstoned(offset) => Some(offset),
            _ => None,
        }
    }
}

/// Byte position of slot `slot`'s directory entry within a page.
/// The directory grows backward from the page tail.
pub(crate) fn slot_pos(slot: usize) -> usize {
    PAGE_SIZE - 2 * (slot + 1)
}

/// Read and decode the directory entry for `slot`
pub(crate) fn read_slot(page: &[u8], slot: usize) -> SlotEntry {
    let pos = slot_pos(slot);
    SlotEntry::decode(u16::from_le_bytes([page[pos], page[pos + 1]]))
}

/// Encode and write the directory entry for `slot`
pub(crate) fn write_slot(page: &mut [u8], slot: usize, entry: SlotEntry) {
    let pos = slot_pos(slot);
    page[pos..pos + 2].copy_from_slice(&entry.encode().to_le_bytes());
}
