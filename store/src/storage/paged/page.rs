//! Page types for the paged B-tree file.
//!
//! Page layout (big-endian):
//! - `num_page`: 4 bytes
//! - `num_child`: 4 bytes (populated slots)
//! - `leaf`: 1 byte
//! - `parent_page`: 8 bytes (file offset, -1 for the root)
//! - `pointer0`: 8 bytes (left child offset)
//! - `degree - 1` slots of 21 bytes: key (4), tombstone (1), address (8),
//!   child pointer (8)
//!
//! Unused slots are written as key 0, tombstone 0, address 0, child -1.

use std::fmt;

use crate::storage::index::IndexEntry;
use crate::storage::paged::file::PagedTreeError;
use crate::storage::paged::layout::{NO_PAGE, PAGE_HEADER_SIZE, PageLayout, SLOT_SIZE};

#[allow(clippy::cast_possible_truncation)]
const HEADER_LEN: usize = PAGE_HEADER_SIZE as usize;
#[allow(clippy::cast_possible_truncation)]
const SLOT_LEN: usize = SLOT_SIZE as usize;

/// A raw page buffer sized for one layout.
pub struct PageBuf {
    data: Vec<u8>,
}

impl PageBuf {
    /// Create a zeroed buffer for one page of `layout`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(layout: &PageLayout) -> Self {
        Self {
            data: vec![0u8; layout.page_size() as usize],
        }
    }

    #[must_use]
    pub const fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Read a big-endian i32 at the given offset.
    #[must_use]
    pub fn read_i32(&self, offset: usize) -> i32 {
        i32::from_be_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    pub fn write_i32(&mut self, offset: usize, value: i32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Read a big-endian i64 at the given offset.
    #[must_use]
    pub fn read_i64(&self, offset: usize) -> i64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        i64::from_be_bytes(buf)
    }

    pub fn write_i64(&mut self, offset: usize, value: i64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
    }
}

impl fmt::Debug for PageBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBuf")
            .field("len", &self.data.len())
            .field("header", &&self.data[..HEADER_LEN.min(self.data.len())])
            .finish_non_exhaustive()
    }
}

/// One page of the paged B-tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTree {
    pub num_page: i32,
    /// Number of populated slots. Slots `0..num_child` are `Some`.
    pub num_child: i32,
    pub leaf: bool,
    /// File offset of the parent page, `NO_PAGE` for the root.
    pub parent_page: i64,
    /// `degree - 1` slots, populated ones first, in ascending key order.
    pub entries: Vec<Option<IndexEntry>>,
    /// `degree` child offsets. `pointers[0]` is the page header's pointer,
    /// `pointers[i + 1]` belongs to slot `i`.
    pub pointers: Vec<i64>,
}

impl PageTree {
    /// An empty page with no children.
    #[must_use]
    pub fn empty(layout: &PageLayout, num_page: i32) -> Self {
        Self {
            num_page,
            num_child: 0,
            leaf: true,
            parent_page: layout.parent_offset(num_page),
            entries: vec![None; layout.slots()],
            pointers: vec![NO_PAGE; layout.slots() + 1],
        }
    }

    /// Populated entries in slot order.
    pub fn live_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter().flatten()
    }

    #[must_use]
    pub fn first_key(&self) -> Option<i32> {
        self.live_entries().next().map(|e| e.key)
    }

    #[must_use]
    pub fn last_key(&self) -> Option<i32> {
        self.live_entries().last().map(|e| e.key)
    }

    /// Slot index of `key` in this page.
    #[must_use]
    pub fn find(&self, key: i32) -> Option<usize> {
        let populated = usize::try_from(self.num_child).unwrap_or(0).min(self.entries.len());
        self.entries[..populated]
            .binary_search_by_key(&key, |e| e.map_or(i32::MIN, |e| e.key))
            .ok()
    }

    /// Serialize into a page buffer for `layout`.
    #[must_use]
    pub fn to_page(&self, layout: &PageLayout) -> PageBuf {
        let mut page = PageBuf::new(layout);
        page.write_i32(0, self.num_page);
        page.write_i32(4, self.num_child);
        page.write_u8(8, u8::from(self.leaf));
        page.write_i64(9, self.parent_page);
        page.write_i64(17, self.pointers.first().copied().unwrap_or(NO_PAGE));

        for i in 0..layout.slots() {
            let at = HEADER_LEN + i * SLOT_LEN;
            let child = self.pointers.get(i + 1).copied().unwrap_or(NO_PAGE);
            // Empty slots keep the zeroed key, tombstone and address.
            if let Some(entry) = self.entries.get(i).copied().flatten() {
                page.write_i32(at, entry.key);
                page.write_u8(at + 4, u8::from(entry.tombstone));
                page.write_i64(at + 5, entry.pointer);
            }
            page.write_i64(at + 13, child);
        }
        page
    }

    /// Deserialize a page written for `layout`.
    pub fn from_page(page: &PageBuf, layout: &PageLayout) -> Result<Self, PagedTreeError> {
        let expected = usize::try_from(layout.page_size()).unwrap_or(usize::MAX);
        if page.len() != expected {
            return Err(PagedTreeError::Corrupt(format!(
                "page buffer is {} bytes, expected {expected}",
                page.len()
            )));
        }

        let num_page = page.read_i32(0);
        let num_child = page.read_i32(4);
        let populated = usize::try_from(num_child)
            .ok()
            .filter(|n| *n <= layout.slots())
            .ok_or_else(|| {
                PagedTreeError::Corrupt(format!("page {num_page} claims {num_child} entries"))
            })?;

        let mut entries = Vec::with_capacity(layout.slots());
        let mut pointers = Vec::with_capacity(layout.slots() + 1);
        pointers.push(page.read_i64(17));
        for i in 0..layout.slots() {
            let at = HEADER_LEN + i * SLOT_LEN;
            entries.push((i < populated).then(|| IndexEntry {
                key: page.read_i32(at),
                tombstone: page.read_u8(at + 4) != 0,
                pointer: page.read_i64(at + 5),
            }));
            pointers.push(page.read_i64(at + 13));
        }

        Ok(Self {
            num_page,
            num_child,
            leaf: page.read_u8(8) != 0,
            parent_page: page.read_i64(9),
            entries,
            pointers,
        })
    }
}

impl fmt::Display for PageTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "page {}", self.num_page)?;
        writeln!(f, "  entries: {}", self.num_child)?;
        writeln!(f, "  leaf: {}", self.leaf)?;
        writeln!(f, "  parent: {}", self.parent_page)?;
        writeln!(f, "  pointer 0: {}", self.pointers.first().copied().unwrap_or(NO_PAGE))?;
        for (i, slot) in self.entries.iter().enumerate() {
            let child = self.pointers.get(i + 1).copied().unwrap_or(NO_PAGE);
            match slot {
                Some(e) => writeln!(
                    f,
                    "  [{i}] key={} tombstone={} address={} child={child}",
                    e.key, e.tombstone, e.pointer
                )?,
                None => writeln!(f, "  [{i}] empty child={child}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(layout: &PageLayout) -> PageTree {
        let mut page = PageTree::empty(layout, 1);
        page.entries[0] = Some(IndexEntry::new(4, 90));
        page.entries[1] = Some(IndexEntry {
            key: 5,
            pointer: 120,
            tombstone: true,
        });
        page.num_child = 2;
        page.leaf = false;
        page.pointers[0] = layout.page_offset(3);
        page.pointers[1] = layout.page_offset(4);
        page
    }

    #[test]
    fn test_page_buf_read_write() {
        let layout = PageLayout::new(4).expect("layout");
        let mut buf = PageBuf::new(&layout);
        assert_eq!(buf.len(), 88);

        buf.write_u8(0, 0xFF);
        assert_eq!(buf.read_u8(0), 0xFF);
        buf.write_i32(10, -7);
        assert_eq!(buf.read_i32(10), -7);
        buf.write_i64(20, 0x0102_0304_0506_0708);
        assert_eq!(buf.read_i64(20), 0x0102_0304_0506_0708);
        assert_eq!(&buf.as_bytes()[20..22], &[0x01, 0x02]);
    }

    #[test]
    fn test_page_roundtrip() {
        let layout = PageLayout::new(4).expect("layout");
        let page = sample(&layout);
        let restored = PageTree::from_page(&page.to_page(&layout), &layout).expect("parse");
        assert_eq!(restored, page);
    }

    #[test]
    fn test_empty_slot_encoding() {
        let layout = PageLayout::new(4).expect("layout");
        let buf = sample(&layout).to_page(&layout);
        let at = HEADER_LEN + 2 * SLOT_LEN;
        assert_eq!(buf.read_i32(at), 0);
        assert_eq!(buf.read_u8(at + 4), 0);
        assert_eq!(buf.read_i64(at + 5), 0);
        assert_eq!(buf.read_i64(at + 13), NO_PAGE);
    }

    #[test]
    fn test_find() {
        let layout = PageLayout::new(4).expect("layout");
        let page = sample(&layout);
        assert_eq!(page.find(4), Some(0));
        assert_eq!(page.find(5), Some(1));
        assert_eq!(page.find(6), None);
        assert_eq!(page.first_key(), Some(4));
        assert_eq!(page.last_key(), Some(5));
    }

    #[test]
    fn test_bad_entry_count_is_corrupt() {
        let layout = PageLayout::new(4).expect("layout");
        let mut buf = sample(&layout).to_page(&layout);
        buf.write_i32(4, 9);
        assert!(matches!(
            PageTree::from_page(&buf, &layout),
            Err(PagedTreeError::Corrupt(_))
        ));
    }

    #[test]
    fn test_display_lists_slots() {
        let layout = PageLayout::new(4).expect("layout");
        let text = sample(&layout).to_string();
        assert!(text.starts_with("page 1\n"));
        assert!(text.contains("[0] key=4 tombstone=false address=90"));
        assert!(text.contains("[2] empty child=-1"));
    }
}
