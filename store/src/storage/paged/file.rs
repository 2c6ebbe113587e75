//! Paged B-tree file I/O.
//!
//! The file starts with a 12-byte header (degree, next page number, last
//! assigned key) followed by fixed-size pages. Every page is read and written
//! at the offset its page number implies, so pages may be written in any
//! order.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::index::{IndexEntry, IndexError};
use crate::storage::paged::layout::{FILE_HEADER_SIZE, NO_PAGE, PageLayout};
use crate::storage::paged::page::{PageBuf, PageTree};

/// The paged tree file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    pub degree: i32,
    /// Number of pages written so far; the next page number to use.
    pub next_page: i32,
    /// Copy of the flat index's last assigned key at build time.
    pub last_key: i32,
}

impl TreeHeader {
    #[allow(clippy::cast_possible_truncation)]
    pub const SIZE: usize = FILE_HEADER_SIZE as usize;

    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.degree.to_be_bytes());
        buf[4..8].copy_from_slice(&self.next_page.to_be_bytes());
        buf[8..12].copy_from_slice(&self.last_key.to_be_bytes());
        buf
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self {
            degree: i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            next_page: i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            last_key: i32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }
}

/// A paged tree file handle.
pub struct PagedTreeFile {
    file: File,
    path: PathBuf,
    layout: PageLayout,
    header: TreeHeader,
    len: u64,
}

impl PagedTreeFile {
    /// Create (or truncate) the file at `path` and write an empty header.
    pub fn create(path: &Path, layout: PageLayout, last_key: i32) -> Result<Self, PagedTreeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut tree_file = Self {
            file,
            path: path.to_path_buf(),
            layout,
            header: TreeHeader {
                degree: layout.degree(),
                next_page: 0,
                last_key,
            },
            len: 0,
        };
        tree_file.write_header()?;
        Ok(tree_file)
    }

    /// Open an existing file and read its header.
    pub fn open(path: &Path) -> Result<Self, PagedTreeError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len < FILE_HEADER_SIZE {
            return Err(PagedTreeError::Corrupt(format!(
                "file is {len} bytes, shorter than its header"
            )));
        }

        let mut buf = [0u8; TreeHeader::SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        let header = TreeHeader::from_bytes(buf);
        let layout = PageLayout::new(header.degree)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            layout,
            header,
            len,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn layout(&self) -> &PageLayout {
        &self.layout
    }

    #[must_use]
    pub const fn header(&self) -> &TreeHeader {
        &self.header
    }

    /// File size in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record the last assigned key in the header.
    pub fn set_last_key(&mut self, last_key: i32) -> Result<(), PagedTreeError> {
        self.header.last_key = last_key;
        self.write_header()
    }

    fn write_header(&mut self) -> Result<(), PagedTreeError> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.to_bytes())?;
        self.len = self.len.max(FILE_HEADER_SIZE);
        Ok(())
    }

    /// Write `page` at its computed offset and bump the header's page count.
    ///
    /// Returns the offset written to.
    pub fn write_page(&mut self, page: &PageTree) -> Result<i64, PagedTreeError> {
        let found = i32::try_from(page.entries.len() + 1).unwrap_or(i32::MAX);
        if page.entries.len() != self.layout.slots() || page.pointers.len() != self.layout.slots() + 1 {
            return Err(PagedTreeError::DegreeMismatch {
                expected: self.layout.degree(),
                found,
            });
        }
        if page.num_page < 0 {
            return Err(PagedTreeError::Corrupt(format!(
                "negative page number {}",
                page.num_page
            )));
        }

        let offset = self.layout.page_offset(page.num_page);
        let start = u64::try_from(offset)
            .map_err(|_| PagedTreeError::Corrupt(format!("negative page offset {offset}")))?;
        let buf = page.to_page(&self.layout);
        self.file.seek(SeekFrom::Start(start))?;
        self.file.write_all(buf.as_bytes())?;
        self.len = self.len.max(start + self.layout.page_size());

        self.header.next_page = self.header.next_page.max(page.num_page + 1);
        self.write_header()?;

        tracing::trace!(num_page = page.num_page, offset, "wrote tree page");
        Ok(offset)
    }

    /// Read the page at file offset `offset`.
    ///
    /// Returns `None` for `NO_PAGE` and for pages that run past the end of
    /// the file.
    pub fn read_page_at(&mut self, offset: i64) -> Result<Option<PageTree>, PagedTreeError> {
        let Ok(start) = u64::try_from(offset) else {
            return Ok(None);
        };
        if start + self.layout.page_size() > self.len {
            return Ok(None);
        }

        let mut buf = PageBuf::new(&self.layout);
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(buf.as_bytes_mut())?;
        PageTree::from_page(&buf, &self.layout).map(Some)
    }

    /// Read page number `num_page`.
    pub fn read_page(&mut self, num_page: i32) -> Result<Option<PageTree>, PagedTreeError> {
        self.read_page_at(self.layout.page_offset(num_page))
    }

    /// Read every reachable page in preorder, starting at page 0 and
    /// following each page's first two child pointers.
    ///
    /// A child past the end of the file ends that branch. Returns each page
    /// with the offset it was read from.
    pub fn read_preorder(&mut self) -> Result<Vec<(i64, PageTree)>, PagedTreeError> {
        let mut pages = Vec::new();
        let mut stack = vec![self.layout.page_offset(0)];

        while let Some(offset) = stack.pop() {
            let Some(page) = self.read_page_at(offset)? else {
                continue;
            };
            if self.layout.page_number_at(offset) != Some(page.num_page) {
                return Err(PagedTreeError::Corrupt(format!(
                    "page {} found at offset {offset}",
                    page.num_page
                )));
            }

            // Right first so the left child is visited first.
            for &child in page.pointers.iter().take(2).rev() {
                if child == NO_PAGE {
                    continue;
                }
                // Children always have higher page numbers, which rules out
                // cycles.
                if self
                    .layout
                    .page_number_at(child)
                    .is_none_or(|n| n <= page.num_page)
                {
                    return Err(PagedTreeError::Corrupt(format!(
                        "page {} has invalid child pointer {child}",
                        page.num_page
                    )));
                }
                stack.push(child);
            }
            pages.push((offset, page));
        }

        Ok(pages)
    }

    /// Find `key` by binary search over page numbers.
    ///
    /// Pages hold consecutive key ranges in page-number order, so only
    /// `O(log pages)` pages are read.
    pub fn search(&mut self, key: i32) -> Result<Option<IndexEntry>, PagedTreeError> {
        let mut lo = 0;
        let mut hi = self.header.next_page;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let Some(page) = self.read_page(mid)? else {
                // Truncated file: search only what is there.
                hi = mid;
                continue;
            };
            match (page.first_key(), page.last_key()) {
                (Some(first), _) if key < first => hi = mid,
                (_, Some(last)) if key > last => lo = mid + 1,
                (Some(_), Some(_)) => {
                    return Ok(page.find(key).and_then(|i| page.entries[i]));
                }
                _ => hi = mid,
            }
        }
        Ok(None)
    }

    pub fn sync(&self) -> Result<(), PagedTreeError> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Errors that can occur during paged tree operations.
#[derive(Debug)]
pub enum PagedTreeError {
    /// I/O error.
    Io(std::io::Error),
    /// Degree outside the supported range.
    InvalidDegree(i32),
    /// A page built for one degree was handed to a file of another.
    DegreeMismatch { expected: i32, found: i32 },
    /// The file does not hold what its layout promises.
    Corrupt(String),
    /// Reading the flat index failed.
    Index(IndexError),
}

impl std::fmt::Display for PagedTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidDegree(d) => write!(f, "invalid page degree {d}"),
            Self::DegreeMismatch { expected, found } => {
                write!(f, "degree mismatch: file uses {expected}, page uses {found}")
            }
            Self::Corrupt(msg) => write!(f, "corrupt tree file: {msg}"),
            Self::Index(e) => write!(f, "index error: {e}"),
        }
    }
}

impl std::error::Error for PagedTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Index(e) => Some(e),
            Self::InvalidDegree(_) | Self::DegreeMismatch { .. } | Self::Corrupt(_) => None,
        }
    }
}

impl From<std::io::Error> for PagedTreeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<IndexError> for PagedTreeError {
    fn from(e: IndexError) -> Self {
        Self::Index(e)
    }
}
