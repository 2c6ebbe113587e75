//! Paged B-tree persisted to its own file.
//!
//! The tree is a snapshot of the flat index: rebuilt from live entries and
//! written whole. Page offsets are a pure function of the degree and the page
//! number, see [`PageLayout`].

mod file;
mod layout;
mod page;
mod tree;

pub use file::{PagedTreeError, PagedTreeFile, TreeHeader};
pub use layout::{
    FILE_HEADER_SIZE, MAX_PAGE_DEGREE, MIN_PAGE_DEGREE, NO_PAGE, PAGE_HEADER_SIZE, PageLayout,
    SLOT_SIZE,
};
pub use page::{PageBuf, PageTree};
pub use tree::PagedBTree;
