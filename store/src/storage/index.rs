//! Flat index file: an append-only log of key to heap offset mappings.
//!
//! # File Format
//!
//! ```text
//! Offset   Size   Field
//! 0        4      last assigned key (i32, big-endian)
//! 4+13*i   4      entry i: key (i32)
//!          8      entry i: heap offset (i64)
//!          1      entry i: tombstone (0 = live, 1 = superseded or deleted)
//! ```
//!
//! Entries are never rewritten except to set the tombstone byte. When a key
//! has more than one entry, the last entry without a tombstone is the one
//! that counts.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Size of the file header (the last assigned key).
pub const INDEX_HEADER_SIZE: u64 = 4;

/// Size of one serialized entry.
pub const INDEX_ENTRY_SIZE: u64 = 13;

/// Byte offset of the tombstone flag within an entry.
const TOMBSTONE_OFFSET: u64 = 12;

/// One key to heap offset mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: i32,
    /// Offset of the record's slot in the heap file.
    pub pointer: i64,
    pub tombstone: bool,
}

impl IndexEntry {
    #[allow(clippy::cast_possible_truncation)]
    pub const SIZE: usize = INDEX_ENTRY_SIZE as usize;

    /// A live entry.
    #[must_use]
    pub const fn new(key: i32, pointer: i64) -> Self {
        Self {
            key,
            pointer,
            tombstone: false,
        }
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.key.to_be_bytes());
        buf[4..12].copy_from_slice(&self.pointer.to_be_bytes());
        buf[12] = u8::from(self.tombstone);
        buf
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        let mut pointer = [0u8; 8];
        pointer.copy_from_slice(&bytes[4..12]);
        Self {
            key: i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            pointer: i64::from_be_bytes(pointer),
            tombstone: bytes[12] != 0,
        }
    }
}

/// File position of entry number `n`.
#[must_use]
pub const fn entry_position(n: u64) -> u64 {
    INDEX_HEADER_SIZE + INDEX_ENTRY_SIZE * n
}

/// Append-only flat index file handle.
///
/// Also owns the auto-increment counter: the last assigned key lives in
/// the file header and nowhere else.
pub struct FlatIndex {
    file: File,
    path: PathBuf,
    last_assigned_key: i32,
    entry_count: u64,
}

impl FlatIndex {
    /// Open the index at `path`, creating it with a zero counter if missing.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(IndexError::Io)?;
        let len = file.metadata().map_err(IndexError::Io)?.len();

        let last_assigned_key = if len < INDEX_HEADER_SIZE {
            file.set_len(0).map_err(IndexError::Io)?;
            file.seek(SeekFrom::Start(0)).map_err(IndexError::Io)?;
            file.write_all(&0i32.to_be_bytes()).map_err(IndexError::Io)?;
            0
        } else {
            let mut buf = [0u8; 4];
            file.seek(SeekFrom::Start(0)).map_err(IndexError::Io)?;
            file.read_exact(&mut buf).map_err(IndexError::Io)?;
            i32::from_be_bytes(buf)
        };

        // A torn trailing entry is not counted.
        let entry_count = len.saturating_sub(INDEX_HEADER_SIZE) / INDEX_ENTRY_SIZE;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            last_assigned_key,
            entry_count,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last key handed out, as stored in the header.
    #[must_use]
    pub const fn last_assigned_key(&self) -> i32 {
        self.last_assigned_key
    }

    /// The key the next insert will receive, `None` once the key space is
    /// used up. Does not touch the file.
    #[must_use]
    pub const fn next_key(&self) -> Option<i32> {
        self.last_assigned_key.checked_add(1)
    }

    /// Persist `key` as the last assigned key.
    pub fn set_last_assigned_key(&mut self, key: i32) -> Result<(), IndexError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(IndexError::Io)?;
        self.file
            .write_all(&key.to_be_bytes())
            .map_err(IndexError::Io)?;
        self.last_assigned_key = key;
        Ok(())
    }

    /// Number of entries ever appended, tombstoned ones included.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.entry_count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Append a live entry and return its file position.
    pub fn append_entry(&mut self, key: i32, pointer: i64) -> Result<u64, IndexError> {
        let position = entry_position(self.entry_count);
        self.file
            .seek(SeekFrom::Start(position))
            .map_err(IndexError::Io)?;
        self.file
            .write_all(&IndexEntry::new(key, pointer).to_bytes())
            .map_err(IndexError::Io)?;
        self.entry_count += 1;
        Ok(position)
    }

    /// Read the entry stored at file position `position`.
    pub fn read_entry_at(&mut self, position: u64) -> Result<IndexEntry, IndexError> {
        self.file
            .seek(SeekFrom::Start(position))
            .map_err(IndexError::Io)?;
        let mut buf = [0u8; IndexEntry::SIZE];
        self.file.read_exact(&mut buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                IndexError::Corrupt(format!("no entry at position {position}"))
            } else {
                IndexError::Io(e)
            }
        })?;
        Ok(IndexEntry::from_bytes(buf))
    }

    /// Iterate over every entry in append order.
    pub fn scan(&mut self) -> Result<IndexScan<'_>, IndexError> {
        self.file
            .seek(SeekFrom::Start(INDEX_HEADER_SIZE))
            .map_err(IndexError::Io)?;
        Ok(IndexScan {
            reader: BufReader::new(&self.file),
            position: INDEX_HEADER_SIZE,
            done: false,
        })
    }

    /// Find the authoritative entry for `key` by a linear scan.
    ///
    /// The whole file is scanned: a later live entry for the same key
    /// replaces an earlier one.
    pub fn scan_find_by_key(&mut self, key: i32) -> Result<Option<IndexEntry>, IndexError> {
        let mut found = None;
        for item in self.scan()? {
            let (_, entry) = item?;
            if entry.key == key && !entry.tombstone {
                found = Some(entry);
            }
        }
        Ok(found)
    }

    /// Point `key` at a new heap offset.
    ///
    /// Tombstones every live entry for `key` and appends a fresh one.
    /// Returns the position of the new entry.
    pub fn update_entry_pointer(&mut self, key: i32, new_pointer: i64) -> Result<u64, IndexError> {
        let positions = self.live_positions(key)?;
        if positions.is_empty() {
            return Err(IndexError::NotFound(key));
        }
        for position in positions {
            self.set_tombstone(position)?;
        }
        self.append_entry(key, new_pointer)
    }

    /// Tombstone every live entry for `key`. Returns how many were marked.
    pub fn mark_deleted(&mut self, key: i32) -> Result<usize, IndexError> {
        let positions = self.live_positions(key)?;
        if positions.is_empty() {
            return Err(IndexError::NotFound(key));
        }
        for &position in &positions {
            self.set_tombstone(position)?;
        }
        Ok(positions.len())
    }

    /// The resolved view of the log: one live entry per key, ordered by key.
    pub fn live_entries(&mut self) -> Result<Vec<IndexEntry>, IndexError> {
        let mut latest = BTreeMap::new();
        for item in self.scan()? {
            let (_, entry) = item?;
            if !entry.tombstone {
                latest.insert(entry.key, entry);
            }
        }
        Ok(latest.into_values().collect())
    }

    /// Every entry in append order.
    pub fn entries(&mut self) -> Result<Vec<IndexEntry>, IndexError> {
        self.scan()?
            .map(|item| item.map(|(_, entry)| entry))
            .collect()
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), IndexError> {
        self.file.sync_all().map_err(IndexError::Io)
    }

    fn live_positions(&mut self, key: i32) -> Result<Vec<u64>, IndexError> {
        let mut positions = Vec::new();
        for item in self.scan()? {
            let (position, entry) = item?;
            if entry.key == key && !entry.tombstone {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    fn set_tombstone(&mut self, position: u64) -> Result<(), IndexError> {
        self.file
            .seek(SeekFrom::Start(position + TOMBSTONE_OFFSET))
            .map_err(IndexError::Io)?;
        self.file.write_all(&[1]).map_err(IndexError::Io)
    }
}

/// Sequential scan over index entries, yielding `(position, entry)`.
///
/// End of file ends the scan; a partial trailing entry is ignored.
pub struct IndexScan<'a> {
    reader: BufReader<&'a File>,
    position: u64,
    done: bool,
}

impl Iterator for IndexScan<'_> {
    type Item = Result<(u64, IndexEntry), IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = [0u8; IndexEntry::SIZE];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {
                let position = self.position;
                self.position += INDEX_ENTRY_SIZE;
                Some(Ok((position, IndexEntry::from_bytes(buf))))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(IndexError::Io(e)))
            }
        }
    }
}

/// Errors that can occur during index operations.
#[derive(Debug)]
pub enum IndexError {
    /// I/O error.
    Io(std::io::Error),
    /// No live entry for the key.
    NotFound(i32),
    /// The file does not hold what its layout promises.
    Corrupt(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::NotFound(key) => write!(f, "no live index entry for key {key}"),
            Self::Corrupt(msg) => write!(f, "corrupt index: {msg}"),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::NotFound(_) | Self::Corrupt(_) => None,
        }
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, FlatIndex) {
        let dir = tempdir().expect("create temp dir");
        let index = FlatIndex::open(&dir.path().join("records.idx")).expect("open index");
        (dir, index)
    }

    #[test]
    fn test_new_index_has_zero_counter() {
        let (_dir, index) = open_temp();
        assert_eq!(index.last_assigned_key(), 0);
        assert_eq!(index.next_key(), Some(1));
        assert!(index.is_empty());
    }

    #[test]
    fn test_entry_bytes_layout() {
        let entry = IndexEntry {
            key: 7,
            pointer: 0x0102,
            tombstone: true,
        };
        let bytes = entry.to_bytes();
        assert_eq!(&bytes[0..4], &[0, 0, 0, 7]);
        assert_eq!(&bytes[4..12], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(bytes[12], 1);
        assert_eq!(IndexEntry::from_bytes(bytes), entry);
    }

    #[test]
    fn test_append_positions() {
        let (_dir, mut index) = open_temp();
        assert_eq!(index.append_entry(1, 0).expect("append"), 4);
        assert_eq!(index.append_entry(2, 10).expect("append"), 17);
        assert_eq!(index.len(), 2);

        let entry = index.read_entry_at(17).expect("read");
        assert_eq!(entry, IndexEntry::new(2, 10));
    }

    #[test]
    fn test_scan_find_by_key() {
        let (_dir, mut index) = open_temp();
        index.append_entry(1, 0).expect("append");
        index.append_entry(2, 10).expect("append");
        index.append_entry(3, 20).expect("append");

        assert_eq!(
            index.scan_find_by_key(2).expect("scan"),
            Some(IndexEntry::new(2, 10))
        );
        assert_eq!(index.scan_find_by_key(9).expect("scan"), None);
    }

    #[test]
    fn test_update_pointer_tombstones_previous() {
        let (_dir, mut index) = open_temp();
        index.append_entry(1, 0).expect("append");
        index.append_entry(2, 10).expect("append");

        index.update_entry_pointer(2, 99).expect("update");

        assert_eq!(
            index.scan_find_by_key(2).expect("scan"),
            Some(IndexEntry::new(2, 99))
        );
        let entries = index.entries().expect("entries");
        assert_eq!(entries.len(), 3);
        assert!(entries[1].tombstone);
        assert_eq!(entries[1].pointer, 10);
        assert!(!entries[2].tombstone);
    }

    #[test]
    fn test_later_live_entry_wins() {
        let (_dir, mut index) = open_temp();
        // Two live entries for the same key, written without going through
        // update_entry_pointer.
        index.append_entry(4, 10).expect("append");
        index.append_entry(4, 50).expect("append");

        assert_eq!(index.scan_find_by_key(4).expect("scan").map(|e| e.pointer), Some(50));
        assert_eq!(index.live_entries().expect("live").len(), 1);
    }

    #[test]
    fn test_update_missing_key() {
        let (_dir, mut index) = open_temp();
        assert!(matches!(
            index.update_entry_pointer(5, 1),
            Err(IndexError::NotFound(5))
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_mark_deleted() {
        let (_dir, mut index) = open_temp();
        index.append_entry(1, 0).expect("append");
        index.append_entry(2, 10).expect("append");

        assert_eq!(index.mark_deleted(1).expect("delete"), 1);
        assert_eq!(index.scan_find_by_key(1).expect("scan"), None);
        assert!(matches!(index.mark_deleted(1), Err(IndexError::NotFound(1))));
    }

    #[test]
    fn test_live_entries_sorted_and_resolved() {
        let (_dir, mut index) = open_temp();
        index.append_entry(3, 30).expect("append");
        index.append_entry(1, 10).expect("append");
        index.append_entry(2, 20).expect("append");
        index.update_entry_pointer(1, 100).expect("update");
        index.mark_deleted(2).expect("delete");

        let live = index.live_entries().expect("live");
        assert_eq!(
            live,
            vec![IndexEntry::new(1, 100), IndexEntry::new(3, 30)]
        );
    }

    #[test]
    fn test_counter_persists() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("records.idx");

        {
            let mut index = FlatIndex::open(&path).expect("open");
            index.append_entry(1, 0).expect("append");
            index.set_last_assigned_key(1).expect("set counter");
            index.sync().expect("sync");
        }

        let mut index = FlatIndex::open(&path).expect("reopen");
        assert_eq!(index.last_assigned_key(), 1);
        assert_eq!(index.next_key(), Some(2));
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.scan_find_by_key(1).expect("scan"),
            Some(IndexEntry::new(1, 0))
        );
    }

    #[test]
    fn test_torn_trailing_entry_ignored() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("records.idx");
        {
            let mut index = FlatIndex::open(&path).expect("open");
            index.append_entry(1, 0).expect("append");
        }
        let mut bytes = std::fs::read(&path).expect("read file");
        bytes.extend_from_slice(&[0, 0, 0]);
        std::fs::write(&path, bytes).expect("write file");

        let mut index = FlatIndex::open(&path).expect("reopen");
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries().expect("entries").len(), 1);
    }
}
