//! In-memory B-tree over index entries.
//!
//! Built by replaying the flat index so lookups take `O(t log_t n)`
//! comparisons instead of a full scan of the index file. Insertion splits
//! full nodes on the way down, so a split never has to propagate back up.
//! The tree is rebuilt rather than maintained across deletes; removing keys
//! is left to the flat index and heap file.

use crate::storage::btree::node::Node;
use crate::storage::index::IndexEntry;

/// Smallest supported minimum degree.
pub const MIN_DEGREE: usize = 2;

/// A B-tree of minimum degree `t`.
#[derive(Debug, Clone)]
pub struct BTree {
    root: Option<Node>,
    min_degree: usize,
    len: usize,
}

impl BTree {
    /// Create an empty tree with minimum degree `min_degree` (at least 2).
    pub const fn new(min_degree: usize) -> Result<Self, BTreeError> {
        if min_degree < MIN_DEGREE {
            return Err(BTreeError::InvalidDegree(min_degree));
        }
        Ok(Self {
            root: None,
            min_degree,
            len: 0,
        })
    }

    /// Build a tree by inserting `entries` in order.
    pub fn from_entries(
        min_degree: usize,
        entries: impl IntoIterator<Item = IndexEntry>,
    ) -> Result<Self, BTreeError> {
        let mut tree = Self::new(min_degree)?;
        for entry in entries {
            tree.insert(entry);
        }
        Ok(tree)
    }

    #[must_use]
    pub const fn min_degree(&self) -> usize {
        self.min_degree
    }

    /// Number of entries in the tree.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    /// Number of levels, 0 for an empty tree.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut node = self.root.as_ref();
        while let Some(n) = node {
            height += 1;
            node = if n.leaf { None } else { n.children.first() };
        }
        height
    }

    /// Insert an entry. Returns the previous entry for the same key, if any.
    pub fn insert(&mut self, entry: IndexEntry) -> Option<IndexEntry> {
        let t = self.min_degree;
        let root = match self.root.take() {
            None => {
                let mut leaf = Node::new_leaf();
                leaf.entries.push(entry);
                self.root = Some(leaf);
                self.len += 1;
                return None;
            }
            Some(root) if root.is_full(t) => {
                let mut new_root = Node::new_parent_of(root);
                new_root.split_child(0, t);
                new_root
            }
            Some(root) => root,
        };

        let root = self.root.insert(root);
        let replaced = root.insert_non_full(entry, t);
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    /// Find the node holding `key` and the entry's position in it.
    #[must_use]
    pub fn search(&self, key: i32) -> Option<(&Node, usize)> {
        self.root.as_ref()?.search(key)
    }

    /// Look up the entry for `key`.
    #[must_use]
    pub fn get(&self, key: i32) -> Option<&IndexEntry> {
        self.search(key).map(|(node, i)| &node.entries[i])
    }

    /// All entries in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<IndexEntry> {
        let mut out = Vec::with_capacity(self.len);
        if let Some(root) = &self.root {
            root.collect_in_order(&mut out);
        }
        out
    }
}

/// Errors that can occur when creating a B-tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BTreeError {
    /// Minimum degree below 2.
    InvalidDegree(usize),
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDegree(t) => {
                write!(f, "invalid minimum degree {t} (must be at least {MIN_DEGREE})")
            }
        }
    }
}

impl std::error::Error for BTreeError {}
