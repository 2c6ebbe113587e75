//! Test that an inserted record is readable at the offset it was written to.

use crate::e2e_tests::helpers::{TestStore, payload};
use crate::storage::SLOT_HEADER_SIZE;

#[test]
fn test_insert_single_record() {
    let mut test = TestStore::new();

    let key = test.insert(b"A");
    assert_eq!(key, 1);

    // key + tombstone + length + payload
    assert_eq!(test.store.heap().len(), 4 + 1 + 4 + 1);

    let slot = test.store.heap_mut().read_slot(0).expect("read slot");
    assert_eq!(slot.key, 1);
    assert!(!slot.tombstone);
    assert_eq!(slot.payload, b"A");

    let entry = test
        .store
        .index_mut()
        .scan_find_by_key(1)
        .expect("scan")
        .expect("entry");
    assert_eq!(entry.pointer, 0);
    assert!(!entry.tombstone);
}

#[test]
fn test_offsets_are_stable() {
    let mut test = TestStore::new();

    let mut expected_offset = 0;
    for n in 1..=50 {
        let bytes = payload(n);
        let offset = test.store.heap_mut().append_slot(n, &bytes).expect("append");
        assert_eq!(offset, expected_offset);

        let slot = test.store.heap_mut().read_slot(offset).expect("read");
        assert_eq!(slot.key, n);
        assert_eq!(slot.payload, bytes);
        expected_offset = slot.end_offset();
    }
    assert_eq!(test.store.heap().len(), expected_offset);
}

#[test]
fn test_records_survive_reopen() {
    let mut test = TestStore::new();
    for n in 1..=20 {
        assert_eq!(test.insert(&payload(n)), n);
    }

    test.reopen();
    assert_eq!(test.store.last_assigned_key(), 20);
    for n in 1..=20 {
        assert_eq!(test.store.get(n).expect("get").payload, payload(n));
    }
    assert_eq!(test.insert(b"next"), 21);

    let first = test.store.get(1).expect("get");
    assert_eq!(first.offset, 0);
    assert_eq!(
        test.store.get(2).expect("get").offset,
        SLOT_HEADER_SIZE + payload(1).len() as u64
    );
}
