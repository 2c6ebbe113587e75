//! Test that growing a record moves it and repoints the index.

use crate::e2e_tests::helpers::TestStore;
use crate::storage::UpdateOutcome;

#[test]
fn test_update_grows_payload() {
    let mut test = TestStore::new();
    test.insert(b"x");
    let key = test.insert(b"ab");
    assert_eq!(key, 2);
    let old_offset = test.store.get(key).expect("get").offset;
    let end_before = test.store.heap().len();

    let outcome = test.store.update(key, b"abcdef").expect("update");
    assert_eq!(
        outcome,
        UpdateOutcome::Relocated {
            from: old_offset,
            to: end_before
        }
    );

    // Old slot is tombstoned, payload untouched.
    let old = test.store.heap_mut().read_slot(old_offset).expect("read old");
    assert!(old.tombstone);
    assert_eq!(old.payload, b"ab");

    // New slot at the old end of file.
    let new = test.store.heap_mut().read_slot(end_before).expect("read new");
    assert_eq!(new.key, 2);
    assert!(!new.tombstone);
    assert_eq!(new.payload, b"abcdef");

    // Index: authoritative entry points at the new slot, the old one is dead.
    let entry = test
        .store
        .index_mut()
        .scan_find_by_key(key)
        .expect("scan")
        .expect("entry");
    assert_eq!(entry.pointer, i64::try_from(end_before).expect("fits"));

    let history: Vec<_> = test
        .store
        .index_mut()
        .entries()
        .expect("entries")
        .into_iter()
        .filter(|e| e.key == key)
        .collect();
    assert_eq!(history.len(), 2);
    assert!(history[0].tombstone);
    assert!(!history[1].tombstone);

    assert_eq!(test.store.get(key).expect("get").payload, b"abcdef");
}

#[test]
fn test_repeated_growth_keeps_one_live_slot() {
    let mut test = TestStore::new();
    let key = test.insert(b"a");

    for len in 2..=10 {
        let outcome = test.store.update(key, &vec![b'z'; len]).expect("update");
        assert!(matches!(outcome, UpdateOutcome::Relocated { .. }));
    }

    let live = test.store.scan().expect("scan");
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].payload, vec![b'z'; 10]);
    assert_eq!(test.store.live_entries().expect("live").len(), 1);
    assert_eq!(test.store.index().len(), 10);
}

#[test]
fn test_shrink_then_grow_within_capacity_stays_in_place() {
    let mut test = TestStore::new();
    let key = test.insert(b"abcdef");

    assert_eq!(
        test.store.update(key, b"ab").expect("update"),
        UpdateOutcome::InPlace { offset: 0 }
    );
    // The slot kept its original six bytes of capacity.
    assert_eq!(
        test.store.update(key, b"abcdef").expect("update"),
        UpdateOutcome::InPlace { offset: 0 }
    );
    assert_eq!(test.store.get(key).expect("get").payload, b"abcdef");
}
