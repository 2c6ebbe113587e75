//! Page arithmetic for the paged B-tree file.
//!
//! Pages have a fixed size that depends only on the tree degree, and page
//! `n` always lives at `FILE_HEADER_SIZE + n * page_size`. Pages are linked
//! as a complete binary tree: page `n` has children `2n+1` and `2n+2` and
//! parent `(n-1)/2`. Every offset stored in a page can therefore be derived
//! from the page number alone.

#![allow(clippy::cast_sign_loss)] // degree and page numbers are validated non-negative

use crate::storage::paged::file::PagedTreeError;

/// Size of the file header: degree, next page number, last assigned key.
pub const FILE_HEADER_SIZE: u64 = 12;

/// Size of a page header: number, entry count, leaf flag, parent, pointer 0.
pub const PAGE_HEADER_SIZE: u64 = 25;

/// Size of one page slot: key, tombstone, address, child pointer.
pub const SLOT_SIZE: u64 = 21;

/// Pointer value meaning "no page".
pub const NO_PAGE: i64 = -1;

/// Smallest degree that leaves room for one entry and two child pointers.
pub const MIN_PAGE_DEGREE: i32 = 2;

/// Largest accepted degree. Keeps page sizes and offsets well inside `i64`.
pub const MAX_PAGE_DEGREE: i32 = 1 << 16;

/// Offsets and sizes for a tree of a given degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    degree: i32,
}

impl PageLayout {
    pub const fn new(degree: i32) -> Result<Self, PagedTreeError> {
        if degree < MIN_PAGE_DEGREE || degree > MAX_PAGE_DEGREE {
            return Err(PagedTreeError::InvalidDegree(degree));
        }
        Ok(Self { degree })
    }

    /// Number of child pointers per page.
    #[must_use]
    pub const fn degree(&self) -> i32 {
        self.degree
    }

    /// Number of entry slots per page (`degree - 1`).
    #[must_use]
    pub const fn slots(&self) -> usize {
        (self.degree - 1) as usize
    }

    /// Serialized page size in bytes.
    #[must_use]
    pub const fn page_size(&self) -> u64 {
        PAGE_HEADER_SIZE + SLOT_SIZE * (self.degree - 1) as u64
    }

    /// File offset of page `num_page`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn page_offset(&self, num_page: i32) -> i64 {
        FILE_HEADER_SIZE as i64 + self.page_size() as i64 * num_page as i64
    }

    /// File offset of the parent of page `num_page`, or `NO_PAGE` for the
    /// root.
    ///
    /// Even and odd page numbers are handled separately to match existing
    /// files; with integer division both branches give `(n - 1) / 2`.
    #[must_use]
    pub const fn parent_offset(&self, num_page: i32) -> i64 {
        if num_page == 0 {
            NO_PAGE
        } else if num_page % 2 == 0 {
            self.page_offset((num_page - 2) / 2)
        } else {
            self.page_offset((num_page - 1) / 2)
        }
    }

    /// Page number of the parent of `num_page`.
    #[must_use]
    pub const fn parent_page(num_page: i32) -> Option<i32> {
        if num_page <= 0 {
            None
        } else {
            Some((num_page - 1) / 2)
        }
    }

    #[must_use]
    pub const fn left_child(num_page: i32) -> i32 {
        2 * num_page + 1
    }

    #[must_use]
    pub const fn right_child(num_page: i32) -> i32 {
        2 * num_page + 2
    }

    /// Offset of page `child` if a tree of `page_count` pages has it,
    /// `NO_PAGE` otherwise.
    #[must_use]
    pub const fn child_offset(&self, child: i32, page_count: i32) -> i64 {
        if child < page_count {
            self.page_offset(child)
        } else {
            NO_PAGE
        }
    }

    /// Inverse of `page_offset`. `None` if `offset` is not a page boundary.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub const fn page_number_at(&self, offset: i64) -> Option<i32> {
        let rel = offset - FILE_HEADER_SIZE as i64;
        let size = self.page_size() as i64;
        if rel < 0 || rel % size != 0 || rel / size > i32::MAX as i64 {
            None
        } else {
            Some((rel / size) as i32)
        }
    }
}
