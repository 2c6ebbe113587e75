//! Test logical and physical deletion.

use crate::e2e_tests::helpers::TestStore;
use crate::storage::{DeleteMode, StoreError, UpdateOutcome};

#[test]
fn test_logical_then_physical_delete_on_heap() {
    let mut test = TestStore::new();
    let heap = test.store.heap_mut();
    heap.append_slot(1, b"one").expect("append");
    heap.append_slot(2, b"two").expect("append");
    let offset = heap.append_slot(3, b"secret").expect("append");

    heap.mark_tombstone(offset).expect("tombstone");
    let slot = heap.read_slot(offset).expect("read");
    assert!(slot.tombstone);
    assert_eq!(slot.payload, b"secret");

    heap.zero_fill(slot.payload_offset(), 6).expect("zero fill");
    let slot = heap.read_slot(offset).expect("read");
    assert_eq!(slot.key, 3);
    assert!(slot.tombstone);
    assert_eq!(slot.payload, vec![0u8; 6]);
}

#[test]
fn test_store_logical_delete() {
    let mut test = TestStore::new();
    for payload in [b"one".as_slice(), b"two", b"three", b"four"] {
        test.insert(payload);
    }
    let offset = test.store.get(3).expect("get").offset;

    test.store.delete(3, DeleteMode::Logical).expect("delete");

    let slot = test.store.heap_mut().read_slot(offset).expect("read");
    assert!(slot.tombstone);
    assert_eq!(slot.payload, b"three");
    assert!(matches!(test.store.get(3), Err(StoreError::NotFound(3))));

    let entries = test.store.index_mut().entries().expect("entries");
    assert!(entries.iter().filter(|e| e.key == 3).all(|e| e.tombstone));
}

#[test]
fn test_store_physical_delete() {
    let mut test = TestStore::new();
    for payload in [b"one".as_slice(), b"two", b"three", b"four"] {
        test.insert(payload);
    }
    let offset = test.store.get(3).expect("get").offset;

    test.store.delete(3, DeleteMode::Physical).expect("delete");

    let slot = test.store.heap_mut().read_slot(offset).expect("read");
    assert!(slot.tombstone);
    assert_eq!(slot.length, 5);
    assert_eq!(slot.payload, vec![0u8; 5]);

    // The scan stays aligned past the zeroed slot.
    let keys: Vec<i32> = test.store.scan().expect("scan").iter().map(|s| s.key).collect();
    assert_eq!(keys, vec![1, 2, 4]);
}

#[test]
fn test_physical_delete_zeroes_superseded_slots() {
    let mut test = TestStore::new();
    let key = test.insert(b"secret");
    let neighbour = test.insert(b"keep");

    let outcome = test.store.update(key, b"secret-v2-longer").expect("update");
    let UpdateOutcome::Relocated { from, to } = outcome else {
        panic!("expected relocation, got {outcome:?}");
    };

    test.store.delete(key, DeleteMode::Physical).expect("delete");

    let heap = test.store.heap_mut();
    for (offset, length) in [(from, 6), (to, 16)] {
        let slot = heap.read_slot(offset).expect("read");
        assert_eq!(slot.key, key);
        assert!(slot.tombstone);
        assert_eq!(slot.payload, vec![0u8; length], "slot at {offset}");
    }
    assert!(matches!(test.store.get(key), Err(StoreError::NotFound(_))));
    assert_eq!(test.store.get(neighbour).expect("get").payload, b"keep");
}

#[test]
fn test_logical_then_physical_delete() {
    let mut test = TestStore::new();
    let key = test.insert(b"secret");
    let offset = test.store.get(key).expect("get").offset;

    test.store.delete(key, DeleteMode::Logical).expect("logical delete");
    assert_eq!(
        test.store.heap_mut().read_slot(offset).expect("read").payload,
        b"secret"
    );

    test.store.delete(key, DeleteMode::Physical).expect("physical delete");
    let slot = test.store.heap_mut().read_slot(offset).expect("read");
    assert!(slot.tombstone);
    assert_eq!(slot.payload, vec![0u8; 6]);

    // Still gone for reads and for a second logical delete.
    assert!(matches!(test.store.get(key), Err(StoreError::NotFound(_))));
    assert!(matches!(
        test.store.delete(key, DeleteMode::Logical),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_physical_delete_of_unknown_key() {
    let mut test = TestStore::new();
    test.insert(b"one");
    assert!(matches!(
        test.store.delete(7, DeleteMode::Physical),
        Err(StoreError::NotFound(7))
    ));
}
