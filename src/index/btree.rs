use std::cmp::Ordering;
use std::path::Path;

use super::error::IndexResult;
use crate::file::{BufferManager, FileHandle, PAGE_SIZE, PageId};

/// Word index of the entry-count field (leaf flag folded in)
pub(crate) const COUNT_WORD: usize = 0;
/// Word index of the auxiliary field: last allocated page, root only
pub(crate) const AUX_WORD: usize = 1;
/// Words of node header before the entry array
pub(crate) const HEADER_WORDS: usize = 2;
/// High bit of the count word marking a leaf node
pub(crate) const LEAF_BIT: i32 = 1 << 15;

const PAGE_WORDS: usize = PAGE_SIZE / 4;

pub(crate) fn read_word(page: &[u8], word: usize) -> i32 {
    let pos = word * 4;
    i32::from_le_bytes(page[pos..pos + 4].try_into().unwrap())
}

pub(crate) fn write_word(page: &mut [u8], word: usize, value: i32) {
    let pos = word * 4;
    page[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
}

/// Ordered multi-value index mapping fixed-width `i32` key tuples to
/// `i32` values (record locators). Duplicate keys are allowed and told
/// apart by value.
///
/// Every node is one page: the count word (leaf flag in the high bit),
/// an auxiliary word, then `key_len + 1` words per entry. The root is
/// always page 0; internal entry 0 is a sentinel whose key is never
/// compared, catching everything below entry 1's key.
///
/// Deletion never merges or rebalances: a node leaves the tree only
/// when it runs completely empty. Freed pages are not recycled.
pub struct BTreeIndex {
    pub(crate) file_handle: FileHandle,
    pub(crate) key_len: usize,
    node_size: usize,
    /// Highest page number allocated so far; persisted in the root's
    /// auxiliary word
    end_page: PageId,
}

impl BTreeIndex {
    /// Create a new index file; page 0 starts as an empty leaf root
    pub fn create<P: AsRef<Path>>(
        bm: &mut BufferManager,
        path: P,
        key_len: usize,
    ) -> IndexResult<Self> {
        let node_size = Self::node_capacity(key_len);

        bm.file_manager_mut().create_file(&path)?;
        let file_handle = bm.file_manager_mut().open_file(&path)?;

        let page = bm.alloc_page(file_handle, 0)?;
        write_word(page, COUNT_WORD, LEAF_BIT);
        write_word(page, AUX_WORD, 0);

        Ok(Self {
            file_handle,
            key_len,
            node_size,
            end_page: 0,
        })
    }

    /// Open an existing index; the key width must match the one the
    /// file was created with
    pub fn open<P: AsRef<Path>>(
        bm: &mut BufferManager,
        path: P,
        key_len: usize,
    ) -> IndexResult<Self> {
        let node_size = Self::node_capacity(key_len);
        let file_handle = bm.file_manager_mut().open_file(&path)?;

        let page = bm.get_page(file_handle, 0)?;
        let end_page = read_word(page, AUX_WORD) as PageId;

        Ok(Self {
            file_handle,
            key_len,
            node_size,
            end_page,
        })
    }

    fn node_capacity(key_len: usize) -> usize {
        assert!(key_len >= 1, "index needs at least one key column");
        let node_size = (PAGE_WORDS - HEADER_WORDS) / (key_len + 1) - 1;
        assert!(node_size >= 2, "key width {} leaves no room to split", key_len);
        node_size
    }

    /// Entries per node before a split is forced
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    // entry layout helpers; `page` is always a full page slice

    pub(crate) fn entry_word(&self, slot: usize) -> usize {
        HEADER_WORDS + (self.key_len + 1) * slot
    }

    pub(crate) fn entry_keys(&self, page: &[u8], slot: usize) -> Vec<i32> {
        let base = self.entry_word(slot);
        (0..self.key_len).map(|i| read_word(page, base + i)).collect()
    }

    pub(crate) fn entry_value(&self, page: &[u8], slot: usize) -> i32 {
        read_word(page, self.entry_word(slot) + self.key_len)
    }

    fn set_entry_keys(&self, page: &mut [u8], slot: usize, keys: &[i32]) {
        let base = self.entry_word(slot);
        for (i, &k) in keys.iter().enumerate() {
            write_word(page, base + i, k);
        }
    }

    fn set_entry_value(&self, page: &mut [u8], slot: usize, value: i32) {
        write_word(page, self.entry_word(slot) + self.key_len, value);
    }

    /// Compare the stored key at `slot` against `keys`, element-wise
    /// left to right
    pub(crate) fn cmp_entry(&self, page: &[u8], slot: usize, keys: &[i32]) -> Ordering {
        let base = self.entry_word(slot);
        for (i, &k) in keys.iter().enumerate() {
            match read_word(page, base + i).cmp(&k) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// First slot in [begin, end) whose key is >= `keys`, or `end`
    pub(crate) fn lower_bound_in(
        &self,
        page: &[u8],
        begin: usize,
        end: usize,
        keys: &[i32],
    ) -> usize {
        let (mut lo, mut hi, mut res) = (begin as isize, end as isize - 1, end);
        while lo <= hi {
            let mid = ((lo + hi) >> 1) as usize;
            if self.cmp_entry(page, mid, keys) == Ordering::Less {
                lo = mid as isize + 1;
            } else {
                res = mid;
                hi = mid as isize - 1;
            }
        }
        res
    }

    /// First slot in [begin, end) whose key is > `keys`, or `end`
    pub(crate) fn upper_bound_in(
        &self,
        page: &[u8],
        begin: usize,
        end: usize,
        keys: &[i32],
    ) -> usize {
        let (mut lo, mut hi, mut res) = (begin as isize, end as isize - 1, end);
        while lo <= hi {
            let mid = ((lo + hi) >> 1) as usize;
            if self.cmp_entry(page, mid, keys) == Ordering::Greater {
                res = mid;
                hi = mid as isize - 1;
            } else {
                lo = mid as isize + 1;
            }
        }
        res
    }

    /// Insert a (key, value) pair.
    ///
    /// Descending, any internal separator key greater than the new key
    /// is lowered to it, so separators never exceed the smallest key of
    /// the subtree they guard (the sentinel at entry 0 included). Leaf
    /// overflow splits ripple upward and may grow a new root.
    pub fn insert(&mut self, bm: &mut BufferManager, keys: &[i32], value: i32) -> IndexResult<()> {
        assert_eq!(keys.len(), self.key_len, "index key arity mismatch");

        // root-to-node path of (page, slot chosen in that page)
        let mut path: Vec<(PageId, usize)> = vec![(0, 0)];
        loop {
            let page_id = path.last().unwrap().0;
            let step = {
                let page = bm.get_page(self.file_handle, page_id)?;
                let raw = read_word(page, COUNT_WORD);
                if raw & LEAF_BIT != 0 {
                    None
                } else {
                    let count = raw as usize;
                    let pos = self.upper_bound_in(page, 1, count, keys) - 1;
                    let lower = self.cmp_entry(page, pos, keys) == Ordering::Greater;
                    Some((self.entry_value(page, pos) as PageId, pos, lower))
                }
            };
            let Some((child, pos, lower)) = step else { break };
            if lower {
                let page = bm.get_page_mut(self.file_handle, page_id)?;
                self.set_entry_keys(page, pos, keys);
            }
            path.push((child, pos));
        }

        let (mut size, mut pos) = {
            let page = bm.get_page(self.file_handle, path.last().unwrap().0)?;
            let size = (read_word(page, COUNT_WORD) & !LEAF_BIT) as usize;
            (size, self.upper_bound_in(page, 0, size, keys))
        };

        let mut carry_keys = keys.to_vec();
        let mut carry_value = value;
        let mut grew = false;
        let stride = (self.key_len + 1) * 4;

        loop {
            let node = path.last().unwrap().0;
            let split = size >= self.node_size;

            // insert the carried entry at `pos`, splitting off the right
            // half in the same borrow when the node overflows
            let split_state = {
                let page = bm.get_page_mut(self.file_handle, node)?;
                let start = self.entry_word(pos) * 4;
                let end = self.entry_word(size) * 4;
                page.copy_within(start..end, start + stride);
                self.set_entry_keys(page, pos, &carry_keys);
                self.set_entry_value(page, pos, carry_value);
                let raw = read_word(page, COUNT_WORD);
                write_word(page, COUNT_WORD, raw + 1);

                if !split {
                    None
                } else {
                    let leaf_flag = (raw & LEAF_BIT) != 0;
                    let size1 = (size >> 1) + 1;
                    let size2 = (size + 1) >> 1;
                    let rstart = self.entry_word(size1) * 4;
                    let right_bytes = page[rstart..rstart + size2 * stride].to_vec();
                    let sep_keys = self.entry_keys(page, size1);
                    write_word(
                        page,
                        COUNT_WORD,
                        if leaf_flag { LEAF_BIT } else { 0 } | size1 as i32,
                    );
                    Some((right_bytes, sep_keys, leaf_flag, size1, size2))
                }
            };

            let Some((right_bytes, sep_keys, leaf_flag, size1, size2)) = split_state else {
                break;
            };
            grew = true;

            // move the right half to a fresh page
            self.end_page += 1;
            let right_page = self.end_page;
            {
                let page = bm.alloc_page(self.file_handle, right_page)?;
                write_word(
                    page,
                    COUNT_WORD,
                    if leaf_flag { LEAF_BIT } else { 0 } | size2 as i32,
                );
                let base = HEADER_WORDS * 4;
                page[base..base + right_bytes.len()].copy_from_slice(&right_bytes);
            }

            // push the split key up
            carry_keys = sep_keys;
            carry_value = right_page as i32;
            pos = path.pop().unwrap().1 + 1;

            if path.is_empty() {
                // the root split: its left half moves to a fresh page
                // and page 0 becomes a 2-entry internal node (entry 0's
                // key is the untouched sentinel)
                self.end_page += 1;
                let left_page = self.end_page;
                let left_bytes = {
                    let page = bm.get_page(self.file_handle, 0)?;
                    page[..self.entry_word(size1) * 4].to_vec()
                };
                {
                    let page = bm.alloc_page(self.file_handle, left_page)?;
                    page[..left_bytes.len()].copy_from_slice(&left_bytes);
                }
                let page = bm.get_page_mut(self.file_handle, 0)?;
                write_word(page, COUNT_WORD, 2);
                self.set_entry_value(page, 0, left_page as i32);
                self.set_entry_keys(page, 1, &carry_keys);
                self.set_entry_value(page, 1, carry_value);
                break;
            }

            size = {
                let page = bm.get_page(self.file_handle, path.last().unwrap().0)?;
                read_word(page, COUNT_WORD) as usize
            };
        }

        if grew {
            let page = bm.get_page_mut(self.file_handle, 0)?;
            write_word(page, AUX_WORD, self.end_page as i32);
        }
        Ok(())
    }

    /// Delete one (key, value) pair. Among equal-key duplicates the
    /// match is found by a linear scan on the value. Returns false
    /// (with a warning) when the pair is not in the tree.
    pub fn delete(&mut self, bm: &mut BufferManager, keys: &[i32], value: i32) -> IndexResult<bool> {
        assert_eq!(keys.len(), self.key_len, "index key arity mismatch");

        let Some(cursor) = self.locate(bm, keys, value)? else {
            log::warn!("index delete: key {:?} value {} not found", keys, value);
            return Ok(false);
        };

        // remove the leaf entry; a node emptied by the removal is
        // unlinked from its parent, up the path (nodes are never merged
        // while they still hold entries)
        let mut stack = cursor.into_stack();
        loop {
            let (page_id, slot) = *stack.last().unwrap();
            let size = {
                let page = bm.get_page_mut(self.file_handle, page_id)?;
                let raw = read_word(page, COUNT_WORD);
                let size = (raw & !LEAF_BIT) as usize;
                let start = self.entry_word(slot + 1) * 4;
                let end = self.entry_word(size) * 4;
                let stride = (self.key_len + 1) * 4;
                page.copy_within(start..end, start - stride);
                write_word(page, COUNT_WORD, raw - 1);
                size
            };
            if page_id == 0 || size > 1 {
                if page_id == 0 && size == 1 {
                    // the tree is drained; the root reverts to an
                    // empty leaf so descent stays well formed
                    let page = bm.get_page_mut(self.file_handle, 0)?;
                    write_word(page, COUNT_WORD, LEAF_BIT);
                }
                break;
            }
            stack.pop();
        }
        Ok(true)
    }

    /// Update one (key, value) pair. An unchanged key overwrites the
    /// value word in place; a changed key degrades to delete + insert
    /// (the insert happens even if the delete found nothing, and the
    /// miss is reported in the returned flag).
    pub fn update(
        &mut self,
        bm: &mut BufferManager,
        old_keys: &[i32],
        old_value: i32,
        new_keys: &[i32],
        new_value: i32,
    ) -> IndexResult<bool> {
        assert_eq!(old_keys.len(), self.key_len, "index key arity mismatch");
        assert_eq!(new_keys.len(), self.key_len, "index key arity mismatch");

        if old_keys != new_keys {
            let found = self.delete(bm, old_keys, old_value)?;
            self.insert(bm, new_keys, new_value)?;
            return Ok(found);
        }

        let Some(cursor) = self.locate(bm, old_keys, old_value)? else {
            log::warn!("index update: key {:?} value {} not found", old_keys, old_value);
            return Ok(false);
        };
        let (page_id, slot) = cursor
            .position()
            .ok_or(super::IndexError::CursorAtEnd)?;
        let page = bm.get_page_mut(self.file_handle, page_id)?;
        self.set_entry_value(page, slot, new_value);
        Ok(true)
    }

    /// Cursor on the exact (key, value) pair, scanning equal-key
    /// duplicates linearly by value
    fn locate(
        &self,
        bm: &mut BufferManager,
        keys: &[i32],
        value: i32,
    ) -> IndexResult<Option<super::IndexCursor>> {
        let mut cursor = self.lower_bound(bm, keys)?;
        loop {
            let Some((page_id, slot)) = cursor.position() else {
                break;
            };
            let (same_key, found) = {
                let page = bm.get_page(self.file_handle, page_id)?;
                let same_key = self.cmp_entry(page, slot, keys) == Ordering::Equal;
                (same_key, same_key && self.entry_value(page, slot) == value)
            };
            if !same_key {
                break;
            }
            if found {
                return Ok(Some(cursor));
            }
            self.advance(bm, &mut cursor)?;
        }
        Ok(None)
    }
}
