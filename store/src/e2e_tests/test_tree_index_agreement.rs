//! Test that both trees agree with the flat index after mixed operations.

use crate::e2e_tests::helpers::{TestStore, churn};
use crate::storage::paged::PagedTreeFile;

#[test]
fn test_trees_match_live_index() {
    let mut test = TestStore::new();
    let live_keys = churn(&mut test, 300, 7);

    let live = test.store.live_entries().expect("live entries");
    let keys: Vec<i32> = live.iter().map(|e| e.key).collect();
    assert_eq!(keys, live_keys);

    let btree = test.store.build_btree(3).expect("btree");
    let paged = test.store.rebuild_paged_tree(5).expect("paged tree");
    let mut file = PagedTreeFile::open(&test.store.tree_path()).expect("open tree file");

    assert_eq!(btree.len(), live.len());
    for entry in &live {
        let in_btree = btree.get(entry.key).expect("key in btree");
        assert_eq!(in_btree.pointer, entry.pointer, "btree key {}", entry.key);

        let (page, slot) = paged.search(entry.key).expect("key in paged tree");
        let stored = page.entries[slot].expect("populated slot");
        assert_eq!(stored.pointer, entry.pointer, "paged key {}", entry.key);

        let on_disk = file.search(entry.key).expect("search").expect("key on disk");
        assert_eq!(on_disk.pointer, entry.pointer, "file key {}", entry.key);

        // The pointer leads to the live slot.
        let slot = test
            .store
            .heap_mut()
            .read_slot(u64::try_from(entry.pointer).expect("offset"))
            .expect("read slot");
        assert_eq!(slot.key, entry.key);
        assert!(!slot.tombstone);
    }

    for key in (1..=300).filter(|k| !live_keys.contains(k)) {
        assert!(btree.get(key).is_none(), "deleted key {key} in btree");
        assert!(paged.get(key).is_none(), "deleted key {key} in paged tree");
        assert!(file.search(key).expect("search").is_none());
    }
}

#[test]
fn test_btree_in_order_equals_live_entries() {
    let mut test = TestStore::new();
    churn(&mut test, 120, 99);

    let live = test.store.live_entries().expect("live entries");
    for t in [2, 3, 8] {
        let tree = test.store.build_btree(t).expect("btree");
        assert_eq!(tree.entries(), live, "t = {t}");
    }
}
