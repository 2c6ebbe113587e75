//! Test that the same sequence of operations produces identical files.

use crate::e2e_tests::helpers::{TestStore, churn};

fn run_sequence() -> Vec<Vec<u8>> {
    let mut test = TestStore::new();
    churn(&mut test, 200, 42);
    test.store.rebuild_paged_tree(8).expect("rebuild");
    test.store.sync().expect("sync");

    ["records.db", "records.idx", "records.tree"]
        .iter()
        .map(|name| std::fs::read(test.path().join(name)).expect("read file"))
        .collect()
}

#[test]
fn test_deterministic_files() {
    let run1 = run_sequence();
    let run2 = run_sequence();

    assert_eq!(run1.len(), run2.len());
    for (i, (a, b)) in run1.iter().zip(run2.iter()).enumerate() {
        assert_eq!(a.len(), b.len(), "file {i} length mismatch");
        assert!(a == b, "file {i} contents differ");
    }
}
