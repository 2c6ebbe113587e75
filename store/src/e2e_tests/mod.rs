//! End-to-end tests at the record store level.
//!
//! Each test file covers a specific scenario against real files in a
//! temporary directory, using deterministic inputs.

#![cfg(test)]

mod helpers;

mod test_delete_modes;
mod test_determinism;
mod test_insert_read;
mod test_paged_reload;
mod test_root_split;
mod test_tree_index_agreement;
mod test_typed_records;
mod test_update_relocates;
