//! In-memory B-tree node.
//!
//! A node with minimum degree `t` holds between `t-1` and `2t-1` entries
//! (the root may hold fewer) and, when internal, one more child than it has
//! entries. `children[i]` holds keys below `entries[i].key` and
//! `children[i+1]` holds keys above it.

use std::cmp::Ordering;

use crate::storage::index::IndexEntry;

/// A B-tree node over index entries, ordered by key.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Entries in strictly increasing key order.
    pub entries: Vec<IndexEntry>,
    /// Child nodes. Empty for leaves, `entries.len() + 1` otherwise.
    pub children: Vec<Self>,
    pub leaf: bool,
}

impl Node {
    /// Create an empty leaf.
    #[must_use]
    pub const fn new_leaf() -> Self {
        Self {
            entries: Vec::new(),
            children: Vec::new(),
            leaf: true,
        }
    }

    /// Create an internal node with a single child and no entries yet.
    /// Only valid as a transient state right before `split_child(0, ..)`.
    #[must_use]
    pub fn new_parent_of(child: Self) -> Self {
        Self {
            entries: Vec::new(),
            children: vec![child],
            leaf: false,
        }
    }

    /// Number of entries in this node.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if the node holds the maximum `2t-1` entries.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_full(&self, min_degree: usize) -> bool {
        self.entries.len() >= 2 * min_degree - 1
    }

    /// Binary search this node's entries for `key`.
    pub fn find_index(&self, key: i32) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&key, |e| e.key)
    }

    /// Find the node holding `key` and the entry's position in it.
    #[must_use]
    pub fn search(&self, key: i32) -> Option<(&Self, usize)> {
        let mut node = self;
        loop {
            match node.find_index(key) {
                Ok(i) => return Some((node, i)),
                Err(_) if node.leaf => return None,
                Err(i) => node = &node.children[i],
            }
        }
    }

    /// Split the full child at `i`.
    ///
    /// The child's median entry moves up into this node at position `i`;
    /// the entries above it move to a new right sibling at `i + 1`. Both
    /// halves end with `t-1` entries.
    pub fn split_child(&mut self, i: usize, min_degree: usize) {
        let child = &mut self.children[i];
        debug_assert!(child.is_full(min_degree), "split_child on a non-full child");

        let right_entries = child.entries.split_off(min_degree);
        let right_children = if child.leaf {
            Vec::new()
        } else {
            child.children.split_off(min_degree)
        };
        let leaf = child.leaf;
        let Some(median) = child.entries.pop() else {
            return;
        };

        self.entries.insert(i, median);
        self.children.insert(
            i + 1,
            Self {
                entries: right_entries,
                children: right_children,
                leaf,
            },
        );
    }

    /// Insert into a node that is known not to be full.
    ///
    /// Any full child on the way down is split before descending into it.
    /// An existing entry with the same key is replaced and returned.
    pub fn insert_non_full(&mut self, entry: IndexEntry, min_degree: usize) -> Option<IndexEntry> {
        let mut node = self;
        loop {
            let mut i = match node.find_index(entry.key) {
                Ok(i) => return Some(std::mem::replace(&mut node.entries[i], entry)),
                Err(i) => i,
            };

            if node.leaf {
                node.entries.insert(i, entry);
                return None;
            }

            if node.children[i].is_full(min_degree) {
                node.split_child(i, min_degree);
                match entry.key.cmp(&node.entries[i].key) {
                    Ordering::Greater => i += 1,
                    Ordering::Equal => {
                        return Some(std::mem::replace(&mut node.entries[i], entry));
                    }
                    Ordering::Less => {}
                }
            }
            node = &mut node.children[i];
        }
    }

    /// Append this subtree's entries to `out` in key order.
    pub fn collect_in_order(&self, out: &mut Vec<IndexEntry>) {
        for (i, entry) in self.entries.iter().enumerate() {
            if !self.leaf {
                self.children[i].collect_in_order(out);
            }
            out.push(*entry);
        }
        if let Some(last) = self.children.last().filter(|_| !self.leaf) {
            last.collect_in_order(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: i32) -> IndexEntry {
        IndexEntry::new(key, i64::from(key) * 100)
    }

    fn leaf_with(keys: &[i32]) -> Node {
        Node {
            entries: keys.iter().copied().map(entry).collect(),
            children: Vec::new(),
            leaf: true,
        }
    }

    #[test]
    fn test_find_index() {
        let node = leaf_with(&[10, 20, 30]);
        assert_eq!(node.find_index(20), Ok(1));
        assert_eq!(node.find_index(5), Err(0));
        assert_eq!(node.find_index(25), Err(2));
        assert_eq!(node.find_index(35), Err(3));
    }

    #[test]
    fn test_split_child_halves() {
        // t = 3: a full node has 5 entries.
        let mut parent = Node::new_parent_of(leaf_with(&[1, 2, 3, 4, 5]));
        parent.split_child(0, 3);

        assert_eq!(parent.entries.len(), 1);
        assert_eq!(parent.entries[0].key, 3);
        assert_eq!(parent.children.len(), 2);
        let left: Vec<i32> = parent.children[0].entries.iter().map(|e| e.key).collect();
        let right: Vec<i32> = parent.children[1].entries.iter().map(|e| e.key).collect();
        assert_eq!(left, vec![1, 2]);
        assert_eq!(right, vec![4, 5]);
        assert!(parent.children[1].leaf);
    }

    #[test]
    fn test_split_internal_child_moves_children() {
        let children: Vec<Node> = (0..4).map(|i| leaf_with(&[i * 10 + 1])).collect();
        let child = Node {
            entries: vec![entry(5), entry(15), entry(25)],
            children,
            leaf: false,
        };
        let mut parent = Node::new_parent_of(child);
        parent.split_child(0, 2);

        assert_eq!(parent.entries[0].key, 15);
        assert_eq!(parent.children[0].children.len(), 2);
        assert_eq!(parent.children[1].children.len(), 2);
        assert_eq!(parent.children[1].children[0].entries[0].key, 21);
    }

    #[test]
    fn test_insert_non_full_leaf_keeps_order() {
        let mut node = leaf_with(&[10, 30]);
        assert!(node.insert_non_full(entry(20), 2).is_none());
        let keys: Vec<i32> = node.entries.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![10, 20, 30]);
    }

    #[test]
    fn test_insert_existing_key_replaces() {
        let mut node = leaf_with(&[10, 20]);
        let replaced = node.insert_non_full(IndexEntry::new(20, 7), 2);
        assert_eq!(replaced, Some(entry(20)));
        assert_eq!(node.entries[1].pointer, 7);
        assert_eq!(node.len(), 2);
    }

    #[test]
    fn test_search_descends() {
        let mut parent = Node::new_parent_of(leaf_with(&[1, 2, 3]));
        parent.split_child(0, 2);

        let (node, i) = parent.search(3).expect("present");
        assert_eq!(node.entries[i].key, 3);
        assert!(node.leaf);
        assert!(parent.search(4).is_none());
    }
}
