//! In-memory B-tree over the flat index.
//!
//! The tree is rebuilt from the index's live entries and answers key lookups
//! without scanning the index file.
//!
//! # Usage
//!
//! ```
//! use store::storage::IndexEntry;
//! use store::storage::btree::BTree;
//!
//! let mut tree = BTree::new(2).expect("degree 2 is valid");
//! for key in 1..=4 {
//!     tree.insert(IndexEntry::new(key, i64::from(key) * 100));
//! }
//!
//! // Four keys with t = 2 split the root once.
//! assert_eq!(tree.height(), 2);
//! assert_eq!(tree.get(3).map(|e| e.pointer), Some(300));
//! ```

mod node;
mod tree;

pub use node::Node;
pub use tree::{BTree, BTreeError, MIN_DEGREE};
