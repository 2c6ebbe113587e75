// Record store layout:
// 1. Records are encoded by the codec into a flat payload
// 2. The payload is appended to the heap file as a slot
// 3. An entry mapping key to slot offset is appended to the flat index
// 4. Lookups either scan the flat index or go through a tree built from it:
//     - In-memory B-tree, rebuilt on demand
//     - Paged B-tree, rebuilt and saved to its own file
//
// Test code is allowed to use unwrap()/expect() for convenience.
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
mod e2e_tests;
pub mod storage;
pub mod types;
