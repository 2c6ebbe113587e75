//! Paged B-tree built from the flat index.
//!
//! Live index entries are sorted by key and packed `degree - 1` to a page,
//! so page `n` holds the `n`-th key range. The pages are linked as a complete
//! binary tree and written in preorder. Reloading walks the same preorder
//! back from disk.

use std::path::Path;

use crate::storage::index::{FlatIndex, IndexEntry};
use crate::storage::paged::file::{PagedTreeError, PagedTreeFile};
use crate::storage::paged::layout::PageLayout;
use crate::storage::paged::page::PageTree;

/// All pages of a paged tree, indexed by page number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedBTree {
    layout: PageLayout,
    pages: Vec<PageTree>,
    last_key: i32,
}

impl PagedBTree {
    /// Pack `entries` into pages. Entries are sorted by key first.
    #[must_use]
    pub fn build(layout: PageLayout, entries: &[IndexEntry], last_key: i32) -> Self {
        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|e| e.key);

        let chunks: Vec<&[IndexEntry]> = sorted.chunks(layout.slots()).collect();
        let page_count = i32::try_from(chunks.len()).unwrap_or(i32::MAX);

        let pages = chunks
            .iter()
            .zip(0..page_count)
            .map(|(chunk, num_page)| {
                let mut page = PageTree::empty(&layout, num_page);
                for (slot, entry) in chunk.iter().enumerate() {
                    page.entries[slot] = Some(*entry);
                }
                page.num_child = i32::try_from(chunk.len()).unwrap_or(i32::MAX);
                page.leaf = PageLayout::left_child(num_page) >= page_count;
                page.pointers[0] = layout.child_offset(PageLayout::left_child(num_page), page_count);
                page.pointers[1] = layout.child_offset(PageLayout::right_child(num_page), page_count);
                page
            })
            .collect();

        Self {
            layout,
            pages,
            last_key,
        }
    }

    /// Build from the live entries of `index`.
    pub fn from_index(index: &mut FlatIndex, layout: PageLayout) -> Result<Self, PagedTreeError> {
        let entries = index.live_entries()?;
        let tree = Self::build(layout, &entries, index.last_assigned_key());
        tracing::debug!(
            entries = entries.len(),
            pages = tree.len(),
            degree = layout.degree(),
            "built paged tree"
        );
        Ok(tree)
    }

    #[must_use]
    pub const fn layout(&self) -> &PageLayout {
        &self.layout
    }

    #[must_use]
    pub fn pages(&self) -> &[PageTree] {
        &self.pages
    }

    #[must_use]
    pub fn page(&self, num_page: i32) -> Option<&PageTree> {
        usize::try_from(num_page).ok().and_then(|n| self.pages.get(n))
    }

    /// Number of pages.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    #[must_use]
    pub const fn last_key(&self) -> i32 {
        self.last_key
    }

    /// Page numbers in preorder: page, left subtree, right subtree.
    #[must_use]
    pub fn preorder(&self) -> Vec<i32> {
        let count = i32::try_from(self.pages.len()).unwrap_or(i32::MAX);
        let mut order = Vec::with_capacity(self.pages.len());
        let mut stack = if count > 0 { vec![0] } else { Vec::new() };
        while let Some(n) = stack.pop() {
            order.push(n);
            for child in [PageLayout::right_child(n), PageLayout::left_child(n)] {
                if child < count {
                    stack.push(child);
                }
            }
        }
        order
    }

    /// Find `key`, returning its page and slot.
    #[must_use]
    pub fn search(&self, key: i32) -> Option<(&PageTree, usize)> {
        let idx = self
            .pages
            .partition_point(|p| p.last_key().is_some_and(|last| last < key));
        let page = self.pages.get(idx)?;
        page.find(key).map(|slot| (page, slot))
    }

    /// Look up the entry for `key`.
    #[must_use]
    pub fn get(&self, key: i32) -> Option<&IndexEntry> {
        self.search(key)
            .and_then(|(page, slot)| page.entries[slot].as_ref())
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.pages.iter().flat_map(PageTree::live_entries)
    }

    /// Write the header and every page, in preorder, to `file`.
    pub fn write_to(&self, file: &mut PagedTreeFile) -> Result<(), PagedTreeError> {
        if file.layout() != &self.layout {
            return Err(PagedTreeError::DegreeMismatch {
                expected: file.layout().degree(),
                found: self.layout.degree(),
            });
        }
        file.set_last_key(self.last_key)?;
        for n in self.preorder() {
            if let Some(page) = self.page(n) {
                file.write_page(page)?;
            }
        }
        Ok(())
    }

    /// Write the tree to a new file at `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<PagedTreeFile, PagedTreeError> {
        let mut file = PagedTreeFile::create(path, self.layout, self.last_key)?;
        self.write_to(&mut file)?;
        file.sync()?;
        tracing::info!(path = %path.display(), pages = self.len(), "saved paged tree");
        Ok(file)
    }

    /// Load a tree from `path` by walking its pages in preorder.
    ///
    /// A file cut short loses the pages past its end; the pages before it
    /// still load.
    pub fn load(path: &Path) -> Result<Self, PagedTreeError> {
        let mut file = PagedTreeFile::open(path)?;
        let layout = *file.layout();
        let last_key = file.header().last_key;

        let mut pages: Vec<PageTree> = file.read_preorder()?.into_iter().map(|(_, p)| p).collect();
        pages.sort_by_key(|p| p.num_page);
        for (expected, page) in (0..).zip(&pages) {
            if page.num_page != expected {
                return Err(PagedTreeError::Corrupt(format!(
                    "expected page {expected}, found page {}",
                    page.num_page
                )));
            }
        }

        tracing::debug!(path = %path.display(), pages = pages.len(), "loaded paged tree");
        Ok(Self {
            layout,
            pages,
            last_key,
        })
    }
}
