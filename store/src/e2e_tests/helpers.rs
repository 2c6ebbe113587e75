//! Common helpers for end-to-end tests.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use crate::storage::{DeleteMode, RecordStore};

/// A record store in a temporary directory that is removed on drop.
pub struct TestStore {
    pub store: RecordStore,
    dir: TempDir,
}

impl TestStore {
    /// Open a fresh, empty store.
    #[must_use]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = RecordStore::open(dir.path()).expect("Failed to open store");
        Self { store, dir }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Drop the open handles and open the same directory again.
    pub fn reopen(&mut self) {
        self.store = RecordStore::open(self.dir.path()).expect("Failed to reopen store");
    }

    /// Insert `payload` and return its key.
    pub fn insert(&mut self, payload: &[u8]) -> i32 {
        self.store.insert(payload).expect("Failed to insert")
    }
}

/// Deterministic payload for record `n`: between 1 and 12 bytes.
#[must_use]
pub fn payload(n: i32) -> Vec<u8> {
    let len = usize::try_from(n.rem_euclid(12)).expect("non-negative") + 1;
    let byte = u8::try_from(n.rem_euclid(256)).expect("fits");
    vec![byte; len]
}

/// Insert `count` records, then update or delete some of them using a
/// seeded generator. Returns the keys still live, in ascending order.
pub fn churn(test: &mut TestStore, count: i32, seed: u64) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    for n in 1..=count {
        test.insert(&payload(n));
    }

    let mut live = Vec::new();
    for key in 1..=count {
        match rng.random_range(0..10) {
            0 => test
                .store
                .delete(key, DeleteMode::Logical)
                .expect("Failed to delete"),
            1 => test
                .store
                .delete(key, DeleteMode::Physical)
                .expect("Failed to delete"),
            2..=4 => {
                let grown = vec![0xAB; 20];
                test.store.update(key, &grown).expect("Failed to update");
                live.push(key);
            }
            _ => live.push(key),
        }
    }
    live
}
