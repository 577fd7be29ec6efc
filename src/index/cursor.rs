use std::cmp::Ordering;

use super::btree::{BTreeIndex, COUNT_WORD, LEAF_BIT, read_word};
use super::error::{IndexError, IndexResult};
use crate::file::{BufferManager, PageId};

/// Position in the index: the root-to-leaf path, each frame holding a
/// page and the entry slot taken in it. An empty stack is the end
/// cursor.
///
/// The cursor holds no page borrows, so insert and delete stay usable
/// between steps; structural changes to the tree invalidate it.
#[derive(Debug, Clone, Default)]
pub struct IndexCursor {
    stack: Vec<(PageId, usize)>,
}

impl IndexCursor {
    pub(crate) fn end() -> Self {
        Self { stack: Vec::new() }
    }

    pub fn is_end(&self) -> bool {
        self.stack.is_empty()
    }

    /// Leaf page and slot under the cursor, unless at end
    pub(crate) fn position(&self) -> Option<(PageId, usize)> {
        self.stack.last().copied()
    }

    pub(crate) fn into_stack(self) -> Vec<(PageId, usize)> {
        self.stack
    }
}

impl BTreeIndex {
    /// Cursor on the smallest entry, or the end cursor when empty
    pub fn begin(&self, bm: &mut BufferManager) -> IndexResult<IndexCursor> {
        let mut cursor = IndexCursor { stack: vec![(0, 0)] };
        let (leaf, count) = {
            let page = bm.get_page(self.file_handle, 0)?;
            let raw = read_word(page, COUNT_WORD);
            (raw & LEAF_BIT != 0, (raw & !LEAF_BIT) as usize)
        };
        if count == 0 {
            return Ok(IndexCursor::end());
        }
        if !leaf {
            let child = {
                let page = bm.get_page(self.file_handle, 0)?;
                self.entry_value(page, 0) as PageId
            };
            self.descend_leftmost(bm, &mut cursor, child)?;
        }
        Ok(cursor)
    }

    /// Cursor on the first entry whose key is >= `keys`
    pub fn lower_bound(&self, bm: &mut BufferManager, keys: &[i32]) -> IndexResult<IndexCursor> {
        assert_eq!(keys.len(), self.key_len, "index key arity mismatch");
        self.search(bm, keys, false)
    }

    /// Cursor on the first entry whose key is > `keys`
    pub fn upper_bound(&self, bm: &mut BufferManager, keys: &[i32]) -> IndexResult<IndexCursor> {
        assert_eq!(keys.len(), self.key_len, "index key arity mismatch");
        self.search(bm, keys, true)
    }

    /// Value of some entry matching `keys` exactly, if any (the
    /// smallest-valued duplicate is not guaranteed)
    pub fn find(&self, bm: &mut BufferManager, keys: &[i32]) -> IndexResult<Option<i32>> {
        let cursor = self.lower_bound(bm, keys)?;
        let Some((page_id, slot)) = cursor.position() else {
            return Ok(None);
        };
        let page = bm.get_page(self.file_handle, page_id)?;
        if self.cmp_entry(page, slot, keys) == Ordering::Equal {
            Ok(Some(self.entry_value(page, slot)))
        } else {
            Ok(None)
        }
    }

    /// Value stored under the cursor
    pub fn cursor_value(&self, bm: &mut BufferManager, cursor: &IndexCursor) -> IndexResult<i32> {
        let (page_id, slot) = cursor.position().ok_or(IndexError::CursorAtEnd)?;
        let page = bm.get_page(self.file_handle, page_id)?;
        Ok(self.entry_value(page, slot))
    }

    /// Key tuple and value under the cursor
    pub fn cursor_entry(
        &self,
        bm: &mut BufferManager,
        cursor: &IndexCursor,
    ) -> IndexResult<(Vec<i32>, i32)> {
        let (page_id, slot) = cursor.position().ok_or(IndexError::CursorAtEnd)?;
        let page = bm.get_page(self.file_handle, page_id)?;
        Ok((self.entry_keys(page, slot), self.entry_value(page, slot)))
    }

    /// Step to the next entry in key order; the cursor becomes the end
    /// cursor past the last entry
    pub fn advance(&self, bm: &mut BufferManager, cursor: &mut IndexCursor) -> IndexResult<()> {
        while let Some(&(page_id, slot)) = cursor.stack.last() {
            let (leaf, count) = {
                let page = bm.get_page(self.file_handle, page_id)?;
                let raw = read_word(page, COUNT_WORD);
                (raw & LEAF_BIT != 0, (raw & !LEAF_BIT) as usize)
            };
            if slot + 1 < count {
                *cursor.stack.last_mut().unwrap() = (page_id, slot + 1);
                if !leaf {
                    let child = {
                        let page = bm.get_page(self.file_handle, page_id)?;
                        self.entry_value(page, slot + 1) as PageId
                    };
                    self.descend_leftmost(bm, cursor, child)?;
                }
                return Ok(());
            }
            cursor.stack.pop();
        }
        Ok(())
    }

    /// Shared descent for both bound searches. Internal levels pick the
    /// last entry not past `keys` (the sentinel catches everything
    /// smaller); the leaf takes the requested bound, and a bound past
    /// the leaf's last entry advances into the next subtree.
    fn search(&self, bm: &mut BufferManager, keys: &[i32], upper: bool) -> IndexResult<IndexCursor> {
        let mut cursor = IndexCursor { stack: vec![(0, 0)] };
        loop {
            let page_id = cursor.stack.last().unwrap().0;
            let (leaf, count) = {
                let page = bm.get_page(self.file_handle, page_id)?;
                let raw = read_word(page, COUNT_WORD);
                (raw & LEAF_BIT != 0, (raw & !LEAF_BIT) as usize)
            };
            if count == 0 {
                return Ok(IndexCursor::end());
            }
            if leaf {
                let slot = {
                    let page = bm.get_page(self.file_handle, page_id)?;
                    if upper {
                        self.upper_bound_in(page, 0, count, keys)
                    } else {
                        self.lower_bound_in(page, 0, count, keys)
                    }
                };
                if slot < count {
                    *cursor.stack.last_mut().unwrap() = (page_id, slot);
                } else {
                    *cursor.stack.last_mut().unwrap() = (page_id, count - 1);
                    self.advance(bm, &mut cursor)?;
                }
                return Ok(cursor);
            }
            let (child, pos) = {
                let page = bm.get_page(self.file_handle, page_id)?;
                // lower_bound must take the left subtree when a
                // separator equals the search key, or duplicates left
                // of a split become unreachable
                let pos = if upper {
                    self.upper_bound_in(page, 1, count, keys) - 1
                } else {
                    self.lower_bound_in(page, 1, count, keys) - 1
                };
                (self.entry_value(page, pos) as PageId, pos)
            };
            *cursor.stack.last_mut().unwrap() = (page_id, pos);
            cursor.stack.push((child, 0));
        }
    }

    /// Extend the cursor down to the smallest entry of the subtree at
    /// `page_id`
    fn descend_leftmost(
        &self,
        bm: &mut BufferManager,
        cursor: &mut IndexCursor,
        page_id: PageId,
    ) -> IndexResult<()> {
        let mut page_id = page_id;
        loop {
            cursor.stack.push((page_id, 0));
            let page = bm.get_page(self.file_handle, page_id)?;
            if read_word(page, COUNT_WORD) & LEAF_BIT != 0 {
                return Ok(());
            }
            page_id = self.entry_value(page, 0) as PageId;
        }
    }
}
