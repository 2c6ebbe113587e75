//! Test that the in-memory B-tree splits its root exactly once at `2t` keys.

use crate::e2e_tests::helpers::{TestStore, payload};
use crate::storage::btree::{BTree, Node};

#[test]
fn test_two_t_keys_split_root_once() {
    for t in 2..=6 {
        let mut test = TestStore::new();
        let count = i32::try_from(2 * t).expect("small");
        for n in 1..count {
            test.insert(&payload(n));
        }

        let before = test.store.build_btree(t).expect("build");
        assert_eq!(before.height(), 1, "t = {t}: 2t-1 keys fit in the root");

        test.insert(&payload(count));
        let tree = test.store.build_btree(t).expect("build");
        assert_eq!(tree.height(), 2, "t = {t}");
        assert_eq!(tree.len(), 2 * t);

        let root = tree.root().expect("root");
        assert_eq!(root.len(), 1);
        assert_eq!(root.children.len(), 2);
        // The split leaves t-1 keys on each side; the 2t-th key then lands
        // on the right.
        assert_eq!(root.children[0].len(), t - 1);
        assert_eq!(root.children[1].len(), t);
    }
}

#[test]
fn test_split_halves_a_full_root() {
    let t = 4;
    let full = BTree::from_entries(
        t,
        (1..=7).map(|k| crate::storage::IndexEntry::new(k, i64::from(k))),
    )
    .expect("build");
    let root = full.root().expect("root").clone();
    assert!(root.is_full(t));

    let mut parent = Node::new_parent_of(root);
    parent.split_child(0, t);
    assert_eq!(parent.len(), 1);
    assert_eq!(parent.entries[0].key, 4);
    assert_eq!(parent.children[0].len(), t - 1);
    assert_eq!(parent.children[1].len(), t - 1);
}
