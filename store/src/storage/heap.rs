//! Heap file of variable-length record slots.
//!
//! # Slot Format
//!
//! ```text
//! Offset   Size     Field
//! 0        4        key (i32, big-endian)
//! 4        1        tombstone (0 = live, 1 = deleted)
//! 5        4        length (i32, big-endian)
//! 9        length   payload
//! ```
//!
//! Slots are packed back to back from offset 0 with no file header, so a
//! sequential scan finds the next slot at `offset + 9 + length`. New slots
//! are only ever appended. An in-place overwrite keeps the recorded length
//! of the slot and zero pads a shorter payload, which keeps the scan aligned.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Size of the fixed slot header in bytes.
pub const SLOT_HEADER_SIZE: u64 = 9;

/// Byte offset of the tombstone flag within a slot.
const TOMBSTONE_OFFSET: u64 = 4;

/// A slot read back from the heap file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapSlot {
    pub key: i32,
    pub tombstone: bool,
    /// Recorded payload length (the slot's capacity).
    pub length: i32,
    pub payload: Vec<u8>,
    /// Position of the slot in the heap file.
    pub offset: u64,
}

impl HeapSlot {
    /// File position of the first payload byte.
    #[must_use]
    pub const fn payload_offset(&self) -> u64 {
        self.offset + SLOT_HEADER_SIZE
    }

    /// File position just past this slot, where the next slot starts.
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // length is validated non-negative on read
    pub const fn end_offset(&self) -> u64 {
        self.payload_offset() + self.length as u64
    }
}

/// Decoded slot header.
#[derive(Debug, Clone, Copy)]
struct SlotHeader {
    key: i32,
    tombstone: bool,
    length: i32,
}

impl SlotHeader {
    #[allow(clippy::cast_possible_truncation)]
    const SIZE: usize = SLOT_HEADER_SIZE as usize;

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.key.to_be_bytes());
        buf[4] = u8::from(self.tombstone);
        buf[5..9].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    const fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self {
            key: i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            tombstone: bytes[4] != 0,
            length: i32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
        }
    }
}

/// Append-only heap file handle.
pub struct HeapFile {
    file: File,
    path: PathBuf,
    len: u64,
}

impl HeapFile {
    /// Open the heap file at `path`, creating an empty one if it is missing.
    pub fn open(path: &Path) -> Result<Self, HeapError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(HeapError::Io)?;
        let len = file.metadata().map_err(HeapError::Io)?.len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            len,
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a live slot at end of file and return its offset.
    pub fn append_slot(&mut self, key: i32, payload: &[u8]) -> Result<u64, HeapError> {
        let length =
            i32::try_from(payload.len()).map_err(|_| HeapError::PayloadTooLarge(payload.len()))?;
        let offset = self.len;
        let header = SlotHeader {
            key,
            tombstone: false,
            length,
        };

        let mut buf = Vec::with_capacity(SlotHeader::SIZE + payload.len());
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(payload);

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(HeapError::Io)?;
        self.file.write_all(&buf).map_err(HeapError::Io)?;
        self.len = offset + buf.len() as u64;

        Ok(offset)
    }

    /// Rewrite the slot at `offset` in place.
    ///
    /// The new payload must fit the slot's recorded length. The recorded
    /// length is kept and any leftover bytes are zeroed.
    pub fn overwrite_slot(
        &mut self,
        offset: u64,
        key: i32,
        tombstone: bool,
        payload: &[u8],
    ) -> Result<(), HeapError> {
        let existing = self.read_header(offset)?;
        let capacity = usize::try_from(existing.length).unwrap_or(0);
        if payload.len() > capacity {
            return Err(HeapError::SlotTooSmall {
                offset,
                capacity,
                requested: payload.len(),
            });
        }

        let header = SlotHeader {
            key,
            tombstone,
            length: existing.length,
        };
        let mut buf = Vec::with_capacity(SlotHeader::SIZE + capacity);
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(payload);
        buf.resize(SlotHeader::SIZE + capacity, 0);

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(HeapError::Io)?;
        self.file.write_all(&buf).map_err(HeapError::Io)
    }

    /// Read the full slot at `offset`.
    pub fn read_slot(&mut self, offset: u64) -> Result<HeapSlot, HeapError> {
        let header = self.read_header(offset)?;
        let length = usize::try_from(header.length).map_err(|_| HeapError::CorruptSlot {
            offset,
            length: header.length,
        })?;
        // A length running past end of file is a torn tail; fail before
        // allocating for it.
        if offset + SLOT_HEADER_SIZE + u64::from(header.length.unsigned_abs()) > self.len {
            return Err(HeapError::EndOfHeap { offset });
        }

        let mut payload = vec![0u8; length];
        self.file
            .read_exact(&mut payload)
            .map_err(|e| eof_to_end_of_heap(e, offset))?;

        Ok(HeapSlot {
            key: header.key,
            tombstone: header.tombstone,
            length: header.length,
            payload,
            offset,
        })
    }

    /// Set the tombstone flag of the slot at `offset`, leaving the payload.
    pub fn mark_tombstone(&mut self, offset: u64) -> Result<(), HeapError> {
        // Validates that a slot header exists at this offset.
        self.read_header(offset)?;
        self.file
            .seek(SeekFrom::Start(offset + TOMBSTONE_OFFSET))
            .map_err(HeapError::Io)?;
        self.file.write_all(&[1]).map_err(HeapError::Io)
    }

    /// Overwrite `length` bytes starting at `offset` with zeros.
    ///
    /// Used for physical deletes; the previous bytes are gone.
    pub fn zero_fill(&mut self, offset: u64, length: u64) -> Result<(), HeapError> {
        if offset + length > self.len {
            return Err(HeapError::EndOfHeap { offset });
        }
        let zeros = vec![0u8; usize::try_from(length).map_err(|_| HeapError::EndOfHeap { offset })?];
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(HeapError::Io)?;
        self.file.write_all(&zeros).map_err(HeapError::Io)
    }

    /// Iterate over every slot from the start of the file, tombstoned ones
    /// included.
    pub const fn scan(&mut self) -> HeapScan<'_> {
        HeapScan {
            heap: self,
            next_offset: 0,
            done: false,
        }
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), HeapError> {
        self.file.sync_all().map_err(HeapError::Io)
    }

    fn read_header(&mut self, offset: u64) -> Result<SlotHeader, HeapError> {
        if offset + SLOT_HEADER_SIZE > self.len {
            return Err(HeapError::EndOfHeap { offset });
        }
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(HeapError::Io)?;
        let mut buf = [0u8; SlotHeader::SIZE];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| eof_to_end_of_heap(e, offset))?;
        Ok(SlotHeader::from_bytes(buf))
    }
}

fn eof_to_end_of_heap(e: std::io::Error, offset: u64) -> HeapError {
    if e.kind() == ErrorKind::UnexpectedEof {
        HeapError::EndOfHeap { offset }
    } else {
        HeapError::Io(e)
    }
}

/// Sequential scan over heap slots.
///
/// Reaching the end of the file ends the iteration. Any other error is
/// yielded once and then the scan stops.
pub struct HeapScan<'a> {
    heap: &'a mut HeapFile,
    next_offset: u64,
    done: bool,
}

impl Iterator for HeapScan<'_> {
    type Item = Result<HeapSlot, HeapError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.heap.read_slot(self.next_offset) {
            Ok(slot) => {
                self.next_offset = slot.end_offset();
                Some(Ok(slot))
            }
            Err(HeapError::EndOfHeap { .. }) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Errors that can occur during heap file operations.
#[derive(Debug)]
pub enum HeapError {
    /// I/O error.
    Io(std::io::Error),
    /// A read ran past the end of the heap file.
    EndOfHeap { offset: u64 },
    /// Payload length does not fit the 32-bit length field.
    PayloadTooLarge(usize),
    /// In-place overwrite with a payload larger than the slot.
    SlotTooSmall {
        offset: u64,
        capacity: usize,
        requested: usize,
    },
    /// Slot header carries a negative length.
    CorruptSlot { offset: u64, length: i32 },
}

impl std::fmt::Display for HeapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::EndOfHeap { offset } => write!(f, "end of heap at offset {offset}"),
            Self::PayloadTooLarge(len) => write!(f, "payload too large: {len} bytes"),
            Self::SlotTooSmall {
                offset,
                capacity,
                requested,
            } => write!(
                f,
                "slot at offset {offset} holds {capacity} bytes, {requested} requested"
            ),
            Self::CorruptSlot { offset, length } => {
                write!(f, "corrupt slot at offset {offset}: length {length}")
            }
        }
    }
}

impl std::error::Error for HeapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::EndOfHeap { .. }
            | Self::PayloadTooLarge(_)
            | Self::SlotTooSmall { .. }
            | Self::CorruptSlot { .. } => None,
        }
    }
}

impl From<std::io::Error> for HeapError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, HeapFile) {
        let dir = tempdir().expect("create temp dir");
        let heap = HeapFile::open(&dir.path().join("records.db")).expect("open heap");
        (dir, heap)
    }

    #[test]
    fn test_append_then_read() {
        let (_dir, mut heap) = open_temp();

        let offset = heap.append_slot(1, b"A").expect("append");
        assert_eq!(offset, 0);
        assert_eq!(heap.len(), 4 + 1 + 4 + 1);

        let slot = heap.read_slot(offset).expect("read");
        assert_eq!(slot.key, 1);
        assert!(!slot.tombstone);
        assert_eq!(slot.length, 1);
        assert_eq!(slot.payload, b"A");
    }

    #[test]
    fn test_offsets_are_consecutive() {
        let (_dir, mut heap) = open_temp();

        let first = heap.append_slot(1, b"abc").expect("append");
        let second = heap.append_slot(2, b"de").expect("append");
        assert_eq!(first, 0);
        assert_eq!(second, SLOT_HEADER_SIZE + 3);

        let slot = heap.read_slot(second).expect("read");
        assert_eq!(slot.key, 2);
        assert_eq!(slot.payload, b"de");
    }

    #[test]
    fn test_overwrite_shorter_keeps_length_and_pads() {
        let (_dir, mut heap) = open_temp();

        let offset = heap.append_slot(5, b"abcdef").expect("append");
        let next = heap.append_slot(6, b"zz").expect("append");
        heap.overwrite_slot(offset, 5, false, b"xy").expect("overwrite");

        let slot = heap.read_slot(offset).expect("read");
        assert_eq!(slot.length, 6);
        assert_eq!(slot.payload, b"xy\0\0\0\0");

        // Neighbour untouched.
        assert_eq!(heap.read_slot(next).expect("read").payload, b"zz");
    }

    #[test]
    fn test_overwrite_larger_rejected() {
        let (_dir, mut heap) = open_temp();

        let offset = heap.append_slot(2, b"ab").expect("append");
        let result = heap.overwrite_slot(offset, 2, false, b"abcdef");
        assert!(matches!(
            result,
            Err(HeapError::SlotTooSmall {
                capacity: 2,
                requested: 6,
                ..
            })
        ));
        assert_eq!(heap.read_slot(offset).expect("read").payload, b"ab");
    }

    #[test]
    fn test_mark_tombstone_keeps_payload() {
        let (_dir, mut heap) = open_temp();

        let offset = heap.append_slot(3, b"keep").expect("append");
        heap.mark_tombstone(offset).expect("tombstone");

        let slot = heap.read_slot(offset).expect("read");
        assert!(slot.tombstone);
        assert_eq!(slot.payload, b"keep");
    }

    #[test]
    fn test_zero_fill_payload() {
        let (_dir, mut heap) = open_temp();

        let offset = heap.append_slot(3, b"gone").expect("append");
        let slot = heap.read_slot(offset).expect("read");
        heap.zero_fill(slot.payload_offset(), 4).expect("zero fill");

        let slot = heap.read_slot(offset).expect("read");
        assert_eq!(slot.key, 3);
        assert_eq!(slot.payload, vec![0u8; 4]);
    }

    #[test]
    fn test_zero_fill_past_end_rejected() {
        let (_dir, mut heap) = open_temp();
        heap.append_slot(1, b"x").expect("append");
        assert!(matches!(
            heap.zero_fill(5, 100),
            Err(HeapError::EndOfHeap { offset: 5 })
        ));
    }

    #[test]
    fn test_read_past_end_is_end_of_heap() {
        let (_dir, mut heap) = open_temp();
        assert!(matches!(
            heap.read_slot(0),
            Err(HeapError::EndOfHeap { offset: 0 })
        ));

        heap.append_slot(1, b"x").expect("append");
        assert!(matches!(
            heap.read_slot(heap.len()),
            Err(HeapError::EndOfHeap { .. })
        ));
    }

    #[test]
    fn test_length_past_end_is_end_of_heap() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("records.db");
        {
            let mut heap = HeapFile::open(&path).expect("open");
            heap.append_slot(1, b"one").expect("append");
            heap.append_slot(2, b"two").expect("append");
        }
        // Second slot's length field claims close to 2 GiB.
        let mut bytes = std::fs::read(&path).expect("read file");
        let length_at = usize::try_from(SLOT_HEADER_SIZE).expect("size") + 3 + 5;
        bytes[length_at..length_at + 4].copy_from_slice(&i32::MAX.to_be_bytes());
        std::fs::write(&path, bytes).expect("write file");

        let mut heap = HeapFile::open(&path).expect("reopen");
        let second = SLOT_HEADER_SIZE + 3;
        assert!(matches!(
            heap.read_slot(second),
            Err(HeapError::EndOfHeap { offset }) if offset == second
        ));
        let keys: Vec<i32> = heap
            .scan()
            .map(|slot| slot.expect("scan").key)
            .collect();
        assert_eq!(keys, vec![1]);
    }

    #[test]
    fn test_scan_yields_all_slots_in_order() {
        let (_dir, mut heap) = open_temp();

        heap.append_slot(1, b"one").expect("append");
        let second = heap.append_slot(2, b"two").expect("append");
        heap.append_slot(3, b"three").expect("append");
        heap.mark_tombstone(second).expect("tombstone");

        let slots: Vec<HeapSlot> = heap
            .scan()
            .collect::<Result<_, _>>()
            .expect("scan");
        let keys: Vec<i32> = slots.iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert!(slots[1].tombstone);
    }

    #[test]
    fn test_scan_empty_heap() {
        let (_dir, mut heap) = open_temp();
        assert_eq!(heap.scan().count(), 0);
    }

    #[test]
    fn test_reopen_preserves_slots() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("records.db");

        let offset = {
            let mut heap = HeapFile::open(&path).expect("open");
            let offset = heap.append_slot(9, b"persisted").expect("append");
            heap.sync().expect("sync");
            offset
        };

        let mut heap = HeapFile::open(&path).expect("reopen");
        assert_eq!(heap.len(), SLOT_HEADER_SIZE + 9);
        let slot = heap.read_slot(offset).expect("read");
        assert_eq!(slot.key, 9);
        assert_eq!(slot.payload, b"persisted");
    }
}
