//! Record store facade.
//!
//! Composes the heap file and the flat index into one keyed store. The
//! index's header counter hands out keys; every heap slot ever written gets
//! an index entry, and relocating a record always appends a fresh entry so
//! the index never points at a stale slot.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::storage::btree::{BTree, BTreeError};
use crate::storage::codec::{CodecError, Record};
use crate::storage::heap::{HeapError, HeapFile, HeapSlot};
use crate::storage::index::{FlatIndex, IndexEntry, IndexError};
use crate::storage::paged::{PageLayout, PagedBTree, PagedTreeError};

/// Heap file name inside a data directory.
pub const HEAP_FILE_NAME: &str = "records.db";

/// Flat index file name inside a data directory.
pub const INDEX_FILE_NAME: &str = "records.idx";

/// Paged tree file name inside a data directory.
pub const TREE_FILE_NAME: &str = "records.tree";

/// How an update was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The new payload fit and was written over the old slot.
    InPlace { offset: u64 },
    /// The old slot was tombstoned and the record appended at `to`.
    Relocated { from: u64, to: u64 },
}

/// How a delete treats the heap bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Set the tombstone and leave the payload readable.
    Logical,
    /// Set the tombstone and zero the payload.
    Physical,
}

/// A keyed record store over a heap file and a flat index.
pub struct RecordStore {
    heap: HeapFile,
    index: FlatIndex,
    dir: PathBuf,
}

impl RecordStore {
    /// Open the store in `dir`, creating empty files if missing.
    ///
    /// The directory itself must exist.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let heap = HeapFile::open(&dir.join(HEAP_FILE_NAME))?;
        let index = FlatIndex::open(&dir.join(INDEX_FILE_NAME))?;
        tracing::debug!(
            dir = %dir.display(),
            heap_bytes = heap.len(),
            index_entries = index.len(),
            last_key = index.last_assigned_key(),
            "opened record store"
        );
        Ok(Self {
            heap,
            index,
            dir: dir.to_path_buf(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the paged tree for this store is saved.
    #[must_use]
    pub fn tree_path(&self) -> PathBuf {
        self.dir.join(TREE_FILE_NAME)
    }

    #[must_use]
    pub const fn heap(&self) -> &HeapFile {
        &self.heap
    }

    pub const fn heap_mut(&mut self) -> &mut HeapFile {
        &mut self.heap
    }

    #[must_use]
    pub const fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub const fn index_mut(&mut self) -> &mut FlatIndex {
        &mut self.index
    }

    #[must_use]
    pub const fn last_assigned_key(&self) -> i32 {
        self.index.last_assigned_key()
    }

    /// Append `payload` under the next key. Returns the key.
    pub fn insert(&mut self, payload: &[u8]) -> Result<i32, StoreError> {
        let key = self.index.next_key().ok_or(StoreError::KeySpaceExhausted)?;
        self.append(key, payload)?;
        Ok(key)
    }

    /// Assign the next key to `record`, encode it and append it.
    pub fn insert_record<R: Record>(&mut self, record: &mut R) -> Result<i32, StoreError> {
        let key = self.index.next_key().ok_or(StoreError::KeySpaceExhausted)?;
        record.assign_key(key);
        let payload = record.encode()?;
        self.append(key, &payload)?;
        Ok(key)
    }

    fn append(&mut self, key: i32, payload: &[u8]) -> Result<u64, StoreError> {
        let offset = self.heap.append_slot(key, payload)?;
        self.index.append_entry(key, to_pointer(offset)?)?;
        self.index.set_last_assigned_key(key)?;
        tracing::debug!(key, offset, len = payload.len(), "inserted record");
        Ok(offset)
    }

    /// Read the live slot for `key`.
    pub fn get(&mut self, key: i32) -> Result<HeapSlot, StoreError> {
        let entry = self.find(key)?;
        let slot = self.heap.read_slot(to_offset(&entry)?)?;
        if slot.key != key || slot.tombstone {
            return Err(StoreError::DanglingPointer {
                key,
                pointer: entry.pointer,
            });
        }
        Ok(slot)
    }

    /// Read and decode the record for `key`.
    pub fn get_record<R: Record>(&mut self, key: i32) -> Result<R, StoreError> {
        let slot = self.get(key)?;
        Ok(R::decode(&slot.payload)?)
    }

    /// Replace the payload of `key`.
    ///
    /// A payload no longer than the slot's recorded length is written in
    /// place. A longer one tombstones the old slot, appends a new slot and
    /// points the index at it.
    pub fn update(&mut self, key: i32, payload: &[u8]) -> Result<UpdateOutcome, StoreError> {
        let slot = self.get(key)?;
        let capacity = usize::try_from(slot.length).unwrap_or(0);

        let outcome = if payload.len() <= capacity {
            self.heap.overwrite_slot(slot.offset, key, false, payload)?;
            UpdateOutcome::InPlace {
                offset: slot.offset,
            }
        } else {
            self.heap.mark_tombstone(slot.offset)?;
            let to = self.heap.append_slot(key, payload)?;
            self.index.update_entry_pointer(key, to_pointer(to)?)?;
            UpdateOutcome::Relocated {
                from: slot.offset,
                to,
            }
        };

        tracing::debug!(key, ?outcome, len = payload.len(), "updated record");
        Ok(outcome)
    }

    /// Encode `record` under `key` and update it.
    pub fn update_record<R: Record>(
        &mut self,
        key: i32,
        record: &mut R,
    ) -> Result<UpdateOutcome, StoreError> {
        record.assign_key(key);
        let payload = record.encode()?;
        self.update(key, &payload)
    }

    /// Delete `key`.
    ///
    /// Logical delete tombstones the live heap slot and the key's index
    /// entries. Physical delete also zeroes the payload of every slot the
    /// index ever recorded for the key, superseded versions included, and
    /// works on a key that was already deleted logically.
    pub fn delete(&mut self, key: i32, mode: DeleteMode) -> Result<(), StoreError> {
        match mode {
            DeleteMode::Logical => {
                let slot = self.get(key)?;
                self.heap.mark_tombstone(slot.offset)?;
                self.index.mark_deleted(key)?;
                tracing::debug!(key, ?mode, offset = slot.offset, "deleted record");
            }
            DeleteMode::Physical => {
                let purged = self.purge(key)?;
                tracing::debug!(key, ?mode, slots = purged, "deleted record");
            }
        }
        Ok(())
    }

    /// Zero and tombstone every heap slot recorded for `key`, then tombstone
    /// its live index entries. Returns the number of slots zeroed.
    fn purge(&mut self, key: i32) -> Result<usize, StoreError> {
        let entries: Vec<IndexEntry> = self
            .index
            .entries()?
            .into_iter()
            .filter(|entry| entry.key == key)
            .collect();
        if entries.is_empty() {
            return Err(StoreError::NotFound(key));
        }

        let offsets: BTreeSet<u64> = entries.iter().map(to_offset).collect::<Result<_, _>>()?;
        for &offset in &offsets {
            let slot = self.heap.read_slot(offset)?;
            if slot.key != key {
                return Err(StoreError::DanglingPointer {
                    key,
                    pointer: to_pointer(offset)?,
                });
            }
            let length = u64::from(slot.length.unsigned_abs());
            self.heap.zero_fill(slot.payload_offset(), length)?;
            self.heap.mark_tombstone(offset)?;
        }

        if entries.iter().any(|entry| !entry.tombstone) {
            self.index.mark_deleted(key)?;
        }
        Ok(offsets.len())
    }

    /// Every live slot in heap order.
    pub fn scan(&mut self) -> Result<Vec<HeapSlot>, StoreError> {
        let mut live = Vec::new();
        for slot in self.heap.scan() {
            let slot = slot?;
            if !slot.tombstone {
                live.push(slot);
            }
        }
        Ok(live)
    }

    /// Every live record in heap order, decoded.
    pub fn scan_records<R: Record>(&mut self) -> Result<Vec<R>, StoreError> {
        self.scan()?
            .iter()
            .map(|slot| R::decode(&slot.payload).map_err(StoreError::from))
            .collect()
    }

    /// The index's resolved view: one live entry per key, in key order.
    pub fn live_entries(&mut self) -> Result<Vec<IndexEntry>, StoreError> {
        Ok(self.index.live_entries()?)
    }

    /// Build an in-memory B-tree of minimum degree `min_degree` over the
    /// live index entries.
    pub fn build_btree(&mut self, min_degree: usize) -> Result<BTree, StoreError> {
        let entries = self.index.live_entries()?;
        let count = entries.len();
        let tree = BTree::from_entries(min_degree, entries)?;
        tracing::debug!(entries = count, height = tree.height(), "built in-memory btree");
        Ok(tree)
    }

    /// Build a paged tree of `degree` over the live index entries.
    pub fn build_paged_tree(&mut self, degree: i32) -> Result<PagedBTree, StoreError> {
        let layout = PageLayout::new(degree)?;
        Ok(PagedBTree::from_index(&mut self.index, layout)?)
    }

    /// Build a paged tree and save it to `tree_path()`.
    pub fn rebuild_paged_tree(&mut self, degree: i32) -> Result<PagedBTree, StoreError> {
        let tree = self.build_paged_tree(degree)?;
        tree.save(&self.tree_path())?;
        Ok(tree)
    }

    /// Load the paged tree saved by `rebuild_paged_tree`.
    pub fn load_paged_tree(&self) -> Result<PagedBTree, StoreError> {
        Ok(PagedBTree::load(&self.tree_path())?)
    }

    /// Sync heap and index to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.heap.sync()?;
        self.index.sync()?;
        Ok(())
    }

    fn find(&mut self, key: i32) -> Result<IndexEntry, StoreError> {
        self.index
            .scan_find_by_key(key)?
            .ok_or(StoreError::NotFound(key))
    }
}

fn to_pointer(offset: u64) -> Result<i64, StoreError> {
    i64::try_from(offset).map_err(|_| StoreError::OffsetOverflow(offset))
}

fn to_offset(entry: &IndexEntry) -> Result<u64, StoreError> {
    u64::try_from(entry.pointer).map_err(|_| StoreError::DanglingPointer {
        key: entry.key,
        pointer: entry.pointer,
    })
}

/// Errors that can occur during record store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Record encode/decode error.
    Codec(CodecError),
    /// Heap file error.
    Heap(HeapError),
    /// Flat index error.
    Index(IndexError),
    /// In-memory tree error.
    BTree(BTreeError),
    /// Paged tree error.
    PagedTree(PagedTreeError),
    /// No live record for the key.
    NotFound(i32),
    /// The index points at a slot that does not hold the live record.
    DanglingPointer { key: i32, pointer: i64 },
    /// The last assigned key is `i32::MAX`.
    KeySpaceExhausted,
    /// A heap offset does not fit the index's pointer field.
    OffsetOverflow(u64),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Heap(e) => write!(f, "heap error: {e}"),
            Self::Index(e) => write!(f, "index error: {e}"),
            Self::BTree(e) => write!(f, "btree error: {e}"),
            Self::PagedTree(e) => write!(f, "paged tree error: {e}"),
            Self::NotFound(key) => write!(f, "record {key} not found"),
            Self::DanglingPointer { key, pointer } => {
                write!(f, "index entry for {key} points at stale offset {pointer}")
            }
            Self::KeySpaceExhausted => write!(f, "no keys left to assign"),
            Self::OffsetOverflow(offset) => write!(f, "heap offset {offset} overflows"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(e) => Some(e),
            Self::Heap(e) => Some(e),
            Self::Index(e) => Some(e),
            Self::BTree(e) => Some(e),
            Self::PagedTree(e) => Some(e),
            Self::NotFound(_)
            | Self::DanglingPointer { .. }
            | Self::KeySpaceExhausted
            | Self::OffsetOverflow(_) => None,
        }
    }
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<HeapError> for StoreError {
    fn from(e: HeapError) -> Self {
        Self::Heap(e)
    }
}

impl From<IndexError> for StoreError {
    fn from(e: IndexError) -> Self {
        Self::Index(e)
    }
}

impl From<BTreeError> for StoreError {
    fn from(e: BTreeError) -> Self {
        Self::BTree(e)
    }
}

impl From<PagedTreeError> for StoreError {
    fn from(e: PagedTreeError) -> Self {
        Self::PagedTree(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CrashReport, sample_report};
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, RecordStore) {
        let dir = tempdir().expect("create temp dir");
        let store = RecordStore::open(dir.path()).expect("open store");
        (dir, store)
    }

    #[test]
    fn test_keys_auto_increment_across_reopen() {
        let dir = tempdir().expect("create temp dir");
        {
            let mut store = RecordStore::open(dir.path()).expect("open store");
            assert_eq!(store.insert(b"a").expect("insert"), 1);
            assert_eq!(store.insert(b"b").expect("insert"), 2);
        }
        let mut store = RecordStore::open(dir.path()).expect("reopen store");
        assert_eq!(store.last_assigned_key(), 2);
        assert_eq!(store.insert(b"c").expect("insert"), 3);
        assert_eq!(store.get(2).expect("get").payload, b"b");
    }

    #[test]
    fn test_update_shorter_is_in_place() {
        let (_dir, mut store) = open_temp();
        let key = store.insert(b"abcdef").expect("insert");

        let outcome = store.update(key, b"xyz").expect("update");
        assert_eq!(outcome, UpdateOutcome::InPlace { offset: 0 });

        let slot = store.get(key).expect("get");
        assert_eq!(slot.length, 6);
        assert_eq!(slot.payload, b"xyz\0\0\0");
        assert_eq!(store.index_mut().entries().expect("entries").len(), 1);
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let (_dir, mut store) = open_temp();
        assert!(matches!(store.get(9), Err(StoreError::NotFound(9))));
        assert!(matches!(
            store.update(9, b"x"),
            Err(StoreError::NotFound(9))
        ));
        assert!(matches!(
            store.delete(9, DeleteMode::Logical),
            Err(StoreError::NotFound(9))
        ));
    }

    #[test]
    fn test_deleted_key_is_gone() {
        let (_dir, mut store) = open_temp();
        let a = store.insert(b"first").expect("insert");
        let b = store.insert(b"second").expect("insert");
        store.delete(a, DeleteMode::Logical).expect("delete");

        assert!(matches!(store.get(a), Err(StoreError::NotFound(_))));
        let live: Vec<i32> = store.scan().expect("scan").iter().map(|s| s.key).collect();
        assert_eq!(live, vec![b]);
        // Keys are never reused.
        assert_eq!(store.insert(b"third").expect("insert"), 3);
    }

    #[test]
    fn test_typed_records() {
        let (_dir, mut store) = open_temp();
        let mut first = sample_report(0);
        let mut second = sample_report(0);
        second.weather_condition = "SNOW".to_string();

        assert_eq!(store.insert_record(&mut first).expect("insert"), 1);
        assert_eq!(store.insert_record(&mut second).expect("insert"), 2);
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let read: CrashReport = store.get_record(2).expect("get");
        assert_eq!(read, second);

        let all: Vec<CrashReport> = store.scan_records().expect("scan");
        assert_eq!(all, vec![first, second]);
    }

    #[test]
    fn test_update_record_keeps_key() {
        let (_dir, mut store) = open_temp();
        let mut report = sample_report(0);
        let key = store.insert_record(&mut report).expect("insert");

        let mut changed = sample_report(99);
        changed.prim_contributory_cause = "UNABLE TO DETERMINE, LONG TEXT".repeat(4);
        let outcome = store.update_record(key, &mut changed).expect("update");
        assert!(matches!(outcome, UpdateOutcome::Relocated { .. }));
        assert_eq!(changed.id, key);

        let read: CrashReport = store.get_record(key).expect("get");
        assert_eq!(read, changed);
    }

    #[test]
    fn test_build_btree_and_paged_tree_agree() {
        let (_dir, mut store) = open_temp();
        for i in 0..50u8 {
            store.insert(&vec![i; usize::from(i % 7) + 1]).expect("insert");
        }
        store.delete(10, DeleteMode::Logical).expect("delete");

        let btree = store.build_btree(3).expect("btree");
        let paged = store.rebuild_paged_tree(4).expect("paged");
        assert_eq!(btree.len(), 49);
        assert!(btree.get(10).is_none());
        assert!(paged.get(10).is_none());
        assert_eq!(paged.last_key(), 50);

        let loaded = store.load_paged_tree().expect("load");
        assert_eq!(loaded, paged);
    }

    #[test]
    fn test_invalid_degrees_surface() {
        let (_dir, mut store) = open_temp();
        assert!(matches!(
            store.build_btree(1),
            Err(StoreError::BTree(BTreeError::InvalidDegree(1)))
        ));
        assert!(matches!(
            store.build_paged_tree(1),
            Err(StoreError::PagedTree(PagedTreeError::InvalidDegree(1)))
        ));
    }
}
