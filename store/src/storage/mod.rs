//! Indexed sequential record storage.
//!
//! # Files
//!
//! A store lives in one directory holding three files:
//!
//! - `records.db`: heap file of `[key][tombstone][length][payload]` slots
//! - `records.idx`: flat index, a last-assigned-key header followed by
//!   `[key][pointer][tombstone]` entries in append order
//! - `records.tree`: paged B-tree snapshot of the index
//!
//! All integers are big-endian.
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use store::storage::{DeleteMode, RecordStore};
//!
//! # fn main() -> Result<(), store::storage::StoreError> {
//! let mut store = RecordStore::open(Path::new("./data"))?;
//! let key = store.insert(b"hello")?;
//! store.update(key, b"hello, world")?;
//! let slot = store.get(key)?;
//! assert_eq!(slot.payload, b"hello, world");
//!
//! let tree = store.rebuild_paged_tree(32)?;
//! assert!(tree.get(key).is_some());
//! store.delete(key, DeleteMode::Logical)?;
//! # Ok(())
//! # }
//! ```

pub mod btree;
mod codec;
mod heap;
mod index;
pub mod paged;
mod store;

pub use codec::{CodecError, Record, RecordReader, RecordWriter};
pub use heap::{HeapError, HeapFile, HeapScan, HeapSlot, SLOT_HEADER_SIZE};
pub use index::{
    FlatIndex, INDEX_ENTRY_SIZE, INDEX_HEADER_SIZE, IndexEntry, IndexError, IndexScan,
    entry_position,
};
pub use store::{
    DeleteMode, HEAP_FILE_NAME, INDEX_FILE_NAME, RecordStore, StoreError, TREE_FILE_NAME,
    UpdateOutcome,
};
