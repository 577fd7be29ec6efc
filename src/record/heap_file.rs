use super::error::{RecordError, RecordResult};
use super::record::{Record, RecordId, SlotId};
use super::schema::RecordSchema;
use super::slot::{self, SlotEntry};
use crate::file::{BufferManager, FileHandle, PAGE_SIZE, PageId};
use std::path::Path;

/// A heap file of schema-homogeneous, variable-length records.
///
/// Page layout: payload bytes grow from offset 0, the slot directory
/// grows backward from the page tail. Every page's directory ends in a
/// `Continuation` marker (the heap resumes on the next page) except the
/// last, which ends in `EndOfFile`. Records are only ever appended at
/// the end cursor; deletes tombstone their slot without reclaiming
/// payload bytes.
pub struct HeapFile {
    file_handle: FileHandle,
    schema: RecordSchema,
    /// Page holding the `EndOfFile` marker
    end_page: PageId,
    /// Slot index of the `EndOfFile` marker within `end_page`
    end_slot: SlotId,
    /// Next free payload byte in `end_page`
    end_offset: usize,
}

/// Position of one live record during a forward scan
#[derive(Debug, Clone, Copy)]
pub struct RecordCursor {
    page_id: PageId,
    slot_id: SlotId,
    at_end: bool,
}

impl RecordCursor {
    fn end() -> Self {
        Self {
            page_id: 0,
            slot_id: 0,
            at_end: true,
        }
    }

    pub fn is_end(&self) -> bool {
        self.at_end
    }

    /// Locator of the record the cursor is positioned on
    pub fn record_id(&self) -> RecordId {
        debug_assert!(!self.at_end, "record_id on an end cursor");
        RecordId::new(self.page_id, self.slot_id)
    }
}

/// A stored offset past the page extent means the slot directory is
/// corrupt; there is no way to continue safely.
fn checked_offset(raw: u16, page_id: PageId, slot_id: SlotId) -> usize {
    let offset = raw as usize;
    if offset >= PAGE_SIZE {
        panic!(
            "corrupted slot directory: page {} slot {} stores offset {} past page end",
            page_id, slot_id, offset
        );
    }
    offset
}

impl HeapFile {
    /// Create a new heap file; page 0 starts with an empty directory
    /// holding only the `EndOfFile` marker.
    pub fn create<P: AsRef<Path>>(
        bm: &mut BufferManager,
        path: P,
        schema: RecordSchema,
    ) -> RecordResult<Self> {
        bm.file_manager_mut().create_file(&path)?;
        let file_handle = bm.file_manager_mut().open_file(&path)?;

        let page = bm.alloc_page(file_handle, 0)?;
        slot::write_slot(page, 0, SlotEntry::EndOfFile);

        Ok(Self {
            file_handle,
            schema,
            end_page: 0,
            end_slot: 0,
            end_offset: 0,
        })
    }

    /// Open an existing heap file, scanning forward once to recover the
    /// append cursor.
    pub fn open<P: AsRef<Path>>(
        bm: &mut BufferManager,
        path: P,
        schema: RecordSchema,
    ) -> RecordResult<Self> {
        let file_handle = bm.file_manager_mut().open_file(&path)?;

        let mut page_id = 0;
        let (end_page, end_slot, end_offset) = loop {
            let page = bm.get_page(file_handle, page_id)?;
            let mut slot_id = 0;
            // next free payload byte as implied by the last entry seen
            let mut offset = 0usize;
            let mut continued = false;
            loop {
                match slot::read_slot(page, slot_id) {
                    SlotEntry::Normal(o) => {
                        let o = checked_offset(o, page_id, slot_id);
                        offset = o + Record::measure(&page[o..], &schema)?;
                        slot_id += 1;
                    }
                    SlotEntry::Tombstoned(o) => {
                        // dead tail; its size is unrecoverable, the
                        // offset alone bounds it from below
                        offset = checked_offset(o, page_id, slot_id);
                        slot_id += 1;
                    }
                    SlotEntry::Continuation => {
                        continued = true;
                        break;
                    }
                    SlotEntry::EndOfFile => break,
                }
            }
            if continued {
                page_id += 1;
                continue;
            }
            break (page_id, slot_id, offset);
        };

        Ok(Self {
            file_handle,
            schema,
            end_page,
            end_slot,
            end_offset,
        })
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Append a record at the end cursor. When the end page cannot take
    /// the payload plus its directory entry, the page is closed with a
    /// `Continuation` marker and the record goes to a fresh page.
    pub fn insert(&mut self, bm: &mut BufferManager, record: &Record) -> RecordResult<RecordId> {
        let bytes = record.serialize(&self.schema)?;

        // an empty page must hold the payload, its slot entry, and the
        // end-of-file marker
        if bytes.len() + 4 > PAGE_SIZE {
            return Err(RecordError::RecordTooLarge(bytes.len()));
        }

        let fits = self.end_offset + bytes.len() + 2 * (self.end_slot + 2) <= PAGE_SIZE;
        if !fits {
            let page = bm.get_page_mut(self.file_handle, self.end_page)?;
            slot::write_slot(page, self.end_slot, SlotEntry::Continuation);

            self.end_page += 1;
            self.end_slot = 0;
            self.end_offset = 0;
            bm.alloc_page(self.file_handle, self.end_page)?;
        }

        let page = bm.get_page_mut(self.file_handle, self.end_page)?;
        page[self.end_offset..self.end_offset + bytes.len()].copy_from_slice(&bytes);
        slot::write_slot(page, self.end_slot, SlotEntry::Normal(self.end_offset as u16));
        slot::write_slot(page, self.end_slot + 1, SlotEntry::EndOfFile);

        let rid = RecordId::new(self.end_page, self.end_slot);
        self.end_slot += 1;
        self.end_offset += bytes.len();
        Ok(rid)
    }

    /// Read the record at `rid`
    pub fn get(&self, bm: &mut BufferManager, rid: RecordId) -> RecordResult<Record> {
        let page = bm.get_page(self.file_handle, rid.page_id)?;
        match slot::read_slot(page, rid.slot_id) {
            SlotEntry::Normal(o) => {
                let o = checked_offset(o, rid.page_id, rid.slot_id);
                Record::deserialize(&page[o..], &self.schema)
            }
            _ => Err(RecordError::InvalidSlot(rid.page_id, rid.slot_id)),
        }
    }

    /// Tombstone the record at `rid`. The payload bytes stay where they
    /// are; only new pages ever reclaim space.
    pub fn delete(&mut self, bm: &mut BufferManager, rid: RecordId) -> RecordResult<()> {
        let page = bm.get_page_mut(self.file_handle, rid.page_id)?;
        match slot::read_slot(page, rid.slot_id) {
            SlotEntry::Normal(o) => {
                slot::write_slot(page, rid.slot_id, SlotEntry::Tombstoned(o));
                Ok(())
            }
            _ => Err(RecordError::InvalidSlot(rid.page_id, rid.slot_id)),
        }
    }

    /// Rewrite the record at `rid`. Overwrites in place when the new
    /// payload fits the gap up to the next slot's recorded offset;
    /// otherwise tombstones the old slot and appends afresh. The
    /// returned locator differs from `rid` exactly in the relocation
    /// case, and any index holding the old locator must be updated.
    pub fn update(
        &mut self,
        bm: &mut BufferManager,
        rid: RecordId,
        record: &Record,
    ) -> RecordResult<RecordId> {
        let bytes = record.serialize(&self.schema)?;

        let (offset, gap_end) = {
            let page = bm.get_page(self.file_handle, rid.page_id)?;
            let offset = match slot::read_slot(page, rid.slot_id) {
                SlotEntry::Normal(o) => checked_offset(o, rid.page_id, rid.slot_id),
                _ => return Err(RecordError::InvalidSlot(rid.page_id, rid.slot_id)),
            };
            let next = rid.slot_id + 1;
            let gap_end = match slot::read_slot(page, next) {
                SlotEntry::Normal(o) | SlotEntry::Tombstoned(o) => {
                    checked_offset(o, rid.page_id, next)
                }
                // last record of a closed page: bounded by the directory
                SlotEntry::Continuation => PAGE_SIZE - 2 * (next + 1),
                // last record of the file: bounded by the append cursor
                SlotEntry::EndOfFile => self.end_offset,
            };
            (offset, gap_end)
        };

        if offset + bytes.len() <= gap_end {
            let page = bm.get_page_mut(self.file_handle, rid.page_id)?;
            page[offset..offset + bytes.len()].copy_from_slice(&bytes);
            return Ok(rid);
        }

        self.delete(bm, rid)?;
        self.insert(bm, record)
    }

    /// Cursor on the first live record, or the end cursor
    pub fn begin(&self, bm: &mut BufferManager) -> RecordResult<RecordCursor> {
        self.settle(bm, 0, 0)
    }

    /// Advance to the next live record
    pub fn advance(&self, bm: &mut BufferManager, cursor: &mut RecordCursor) -> RecordResult<()> {
        if !cursor.at_end {
            *cursor = self.settle(bm, cursor.page_id, cursor.slot_id + 1)?;
        }
        Ok(())
    }

    /// Read the record under the cursor
    pub fn cursor_record(
        &self,
        bm: &mut BufferManager,
        cursor: &RecordCursor,
    ) -> RecordResult<Record> {
        self.get(bm, cursor.record_id())
    }

    /// Collect every live record in heap order
    pub fn scan(&self, bm: &mut BufferManager) -> RecordResult<Vec<(RecordId, Record)>> {
        let mut results = Vec::new();
        let mut cursor = self.begin(bm)?;
        while !cursor.is_end() {
            let rid = cursor.record_id();
            results.push((rid, self.get(bm, rid)?));
            self.advance(bm, &mut cursor)?;
        }
        Ok(results)
    }

    /// Walk forward from (page, slot) to the first live slot
    fn settle(
        &self,
        bm: &mut BufferManager,
        mut page_id: PageId,
        mut slot_id: SlotId,
    ) -> RecordResult<RecordCursor> {
        loop {
            let entry = {
                let page = bm.get_page(self.file_handle, page_id)?;
                slot::read_slot(page, slot_id)
            };
            match entry {
                SlotEntry::Normal(_) => {
                    return Ok(RecordCursor {
                        page_id,
                        slot_id,
                        at_end: false,
                    });
                }
                SlotEntry::Tombstoned(_) => slot_id += 1,
                SlotEntry::Continuation => {
                    page_id += 1;
                    slot_id = 0;
                }
                SlotEntry::EndOfFile => return Ok(RecordCursor::end()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PagedFileManager;
    use tempfile::TempDir;

    fn setup_test_env() -> (TempDir, BufferManager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let buffer_manager = BufferManager::new(PagedFileManager::new());
        (temp_dir, buffer_manager)
    }

    fn sample_record(id: i32, name: &str) -> Record {
        Record::new(vec![Some(id), Some(id * 10)], vec![Some(name.to_string())])
    }

    fn sample_schema() -> RecordSchema {
        RecordSchema::new(2, 1)
    }

    #[test]
    fn test_insert_and_get() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("t.dat");

        let mut heap = HeapFile::create(&mut bm, &path, sample_schema()).unwrap();
        let record = sample_record(1, "Alice");
        let rid = heap.insert(&mut bm, &record).unwrap();

        assert_eq!(rid, RecordId::new(0, 0));
        assert_eq!(heap.get(&mut bm, rid).unwrap(), record);
    }

    #[test]
    fn test_insert_many_and_scan_in_order() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("t.dat");

        let mut heap = HeapFile::create(&mut bm, &path, sample_schema()).unwrap();
        let mut expected = Vec::new();
        for i in 0..50 {
            let record = sample_record(i, &format!("user{}", i));
            let rid = heap.insert(&mut bm, &record).unwrap();
            expected.push((rid, record));
        }

        assert_eq!(heap.scan(&mut bm).unwrap(), expected);
    }

    #[test]
    fn test_tombstone_skipped_by_cursor() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("t.dat");

        let mut heap = HeapFile::create(&mut bm, &path, sample_schema()).unwrap();
        let r1 = sample_record(1, "one");
        let r2 = sample_record(2, "two");
        let r3 = sample_record(3, "three");
        let rid1 = heap.insert(&mut bm, &r1).unwrap();
        let rid2 = heap.insert(&mut bm, &r2).unwrap();
        let rid3 = heap.insert(&mut bm, &r3).unwrap();

        heap.delete(&mut bm, rid2).unwrap();

        let scanned = heap.scan(&mut bm).unwrap();
        assert_eq!(scanned, vec![(rid1, r1), (rid3, r3)]);

        // deleted slot no longer readable, delete not repeatable
        assert!(heap.get(&mut bm, rid2).is_err());
        assert!(heap.delete(&mut bm, rid2).is_err());
    }

    #[test]
    fn test_update_in_place_keeps_locator() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("t.dat");

        let mut heap = HeapFile::create(&mut bm, &path, sample_schema()).unwrap();
        let rid = heap.insert(&mut bm, &sample_record(1, "abcdef")).unwrap();
        heap.insert(&mut bm, &sample_record(2, "next")).unwrap();

        // same size and smaller both stay put
        let same = sample_record(9, "fedcba");
        assert_eq!(heap.update(&mut bm, rid, &same).unwrap(), rid);
        assert_eq!(heap.get(&mut bm, rid).unwrap(), same);

        let smaller = sample_record(8, "ab");
        assert_eq!(heap.update(&mut bm, rid, &smaller).unwrap(), rid);
        assert_eq!(heap.get(&mut bm, rid).unwrap(), smaller);
    }

    #[test]
    fn test_update_that_grows_relocates() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("t.dat");

        let mut heap = HeapFile::create(&mut bm, &path, sample_schema()).unwrap();
        let rid1 = heap.insert(&mut bm, &sample_record(1, "short")).unwrap();
        let rid2 = heap.insert(&mut bm, &sample_record(2, "next")).unwrap();

        let grown = sample_record(1, &"x".repeat(200));
        let new_rid = heap.update(&mut bm, rid1, &grown).unwrap();
        assert_ne!(new_rid, rid1);
        assert_eq!(heap.get(&mut bm, new_rid).unwrap(), grown);

        // old slot is tombstoned: not readable, not iterated
        assert!(heap.get(&mut bm, rid1).is_err());
        let rids: Vec<RecordId> = heap
            .scan(&mut bm)
            .unwrap()
            .into_iter()
            .map(|(rid, _)| rid)
            .collect();
        assert_eq!(rids, vec![rid2, new_rid]);
    }

    #[test]
    fn test_grow_last_record_relocates() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("t.dat");

        // the newest record is bounded by the append cursor, so growing
        // it cannot fit in place and must relocate
        let mut heap = HeapFile::create(&mut bm, &path, sample_schema()).unwrap();
        let rid = heap.insert(&mut bm, &sample_record(1, "tail")).unwrap();
        let grown = sample_record(1, "tail plus more");
        let new_rid = heap.update(&mut bm, rid, &grown).unwrap();
        assert_ne!(new_rid, rid);
        assert_eq!(heap.get(&mut bm, new_rid).unwrap(), grown);
    }

    #[test]
    fn test_multi_page_heap() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("t.dat");

        let mut heap = HeapFile::create(&mut bm, &path, sample_schema()).unwrap();
        let body = "p".repeat(1000);
        let mut rids = Vec::new();
        for i in 0..30 {
            let rid = heap.insert(&mut bm, &sample_record(i, &body)).unwrap();
            rids.push(rid);
        }

        // ~1KB records cannot all share page 0
        assert!(rids.last().unwrap().page_id > 0);

        let scanned = heap.scan(&mut bm).unwrap();
        assert_eq!(scanned.len(), 30);
        for (i, (rid, record)) in scanned.iter().enumerate() {
            assert_eq!(*rid, rids[i]);
            assert_eq!(record.get_int(0), Some(i as i32));
        }
    }

    #[test]
    fn test_record_too_large() {
        let (temp_dir, mut bm) = setup_test_env();
        let path = temp_dir.path().join("t.dat");

        let mut heap = HeapFile::create(&mut bm, &path, sample_schema()).unwrap();
        let huge = sample_record(1, &"z".repeat(PAGE_SIZE));
        assert!(matches!(
            heap.insert(&mut bm, &huge),
            Err(RecordError::RecordTooLarge(_))
        ));
    }

    #[test]
    fn test_reopen_resumes_appending() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.dat");
        let schema = sample_schema();
        let body = "q".repeat(700);

        let mut rids = Vec::new();
        {
            let mut bm = BufferManager::new(PagedFileManager::new());
            let mut heap = HeapFile::create(&mut bm, &path, schema).unwrap();
            for i in 0..20 {
                rids.push(heap.insert(&mut bm, &sample_record(i, &body)).unwrap());
            }
            heap.delete(&mut bm, rids[3]).unwrap();
            bm.flush_all().unwrap();
        }

        let mut bm = BufferManager::new(PagedFileManager::new());
        let mut heap = HeapFile::open(&mut bm, &path, schema).unwrap();

        // previous contents intact, tombstone still skipped
        let scanned = heap.scan(&mut bm).unwrap();
        assert_eq!(scanned.len(), 19);
        assert_eq!(scanned[0].0, rids[0]);

        // appending continues past the recovered end cursor without
        // clobbering anything
        let extra = sample_record(99, "after reopen");
        let rid = heap.insert(&mut bm, &extra).unwrap();
        assert!(!rids.contains(&rid));
        assert_eq!(heap.get(&mut bm, rid).unwrap(), extra);
        assert_eq!(heap.scan(&mut bm).unwrap().len(), 20);
    }
}
