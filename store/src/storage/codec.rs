//! Record codec.
//!
//! Records are stored as a flat concatenation of fields in a fixed order:
//!
//! - Numeric fields: fixed width, big-endian (`i32`, `i64`, `f32`)
//! - Flags: one byte (0 or 1)
//! - Text: `u16` byte length followed by UTF-8 bytes
//! - Text lists: `i32` element count followed by that many text fields
//!
//! There is no version tag. Decoding reads fields in exactly the order they
//! were written, so a change to a record's field order is not backward
//! compatible.

/// A typed value that can be turned into a heap payload and back.
pub trait Record: Sized {
    /// Serialize the record into a payload.
    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a record from a payload.
    ///
    /// Trailing bytes after the last field are ignored. In-place updates
    /// leave zero padding after shorter payloads.
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;

    /// Called by the store with the auto-incremented key before encoding a
    /// new record. Records that carry their own id override this.
    fn assign_key(&mut self, _key: i32) {}
}

/// Appends fields to a payload buffer.
#[derive(Debug, Default)]
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Write a length-prefixed text field.
    ///
    /// Returns `FieldTooLong` if the UTF-8 encoding does not fit a `u16`.
    pub fn put_str(&mut self, value: &str) -> Result<(), CodecError> {
        let len = u16::try_from(value.len()).map_err(|_| CodecError::FieldTooLong {
            len: value.len(),
        })?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Write a counted list of text fields.
    pub fn put_str_list(&mut self, values: &[String]) -> Result<(), CodecError> {
        let count = i32::try_from(values.len()).map_err(|_| CodecError::FieldTooLong {
            len: values.len(),
        })?;
        self.put_i32(count);
        for value in values {
            self.put_str(value)?;
        }
        Ok(())
    }

    /// Number of bytes written so far.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer and return the payload.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields back out of a payload, in write order.
#[derive(Debug)]
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current read position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the current position.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Take the next `n` bytes, failing if the payload is too short.
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::MalformedRecord {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn get_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn get_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(u32::from_be_bytes(self.take_array()?)))
    }

    pub fn get_bool(&mut self) -> Result<bool, CodecError> {
        let [byte] = self.take_array::<1>()?;
        Ok(byte != 0)
    }

    pub fn get_str(&mut self) -> Result<String, CodecError> {
        let len = u16::from_be_bytes(self.take_array()?) as usize;
        let start = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8 { offset: start })
    }

    pub fn get_str_list(&mut self) -> Result<Vec<String>, CodecError> {
        let offset = self.pos;
        let count = self.get_i32()?;
        // Every element needs at least its two-byte length prefix.
        let count = usize::try_from(count)
            .ok()
            .filter(|c| c.saturating_mul(2) <= self.remaining())
            .ok_or_else(|| CodecError::MalformedRecord {
                offset,
                needed: usize::try_from(count).unwrap_or(usize::MAX),
                available: self.remaining(),
            })?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.get_str()?);
        }
        Ok(values)
    }
}

/// Errors produced while encoding or decoding a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A length prefix or fixed-width field would read past the payload.
    MalformedRecord {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// Text field bytes are not valid UTF-8.
    InvalidUtf8 { offset: usize },
    /// A text field or list is too long for its length prefix.
    FieldTooLong { len: usize },
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedRecord {
                offset,
                needed,
                available,
            } => write!(
                f,
                "malformed record at byte {offset}: needed {needed} bytes, {available} available"
            ),
            Self::InvalidUtf8 { offset } => write!(f, "invalid UTF-8 text at byte {offset}"),
            Self::FieldTooLong { len } => write!(f, "field too long: {len}"),
        }
    }
}

impl std::error::Error for CodecError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_fields_are_big_endian() {
        let mut writer = RecordWriter::new();
        writer.put_i32(1);
        writer.put_i64(-2);
        writer.put_bool(true);
        let bytes = writer.finish();

        assert_eq!(&bytes[..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..12], &(-2i64).to_be_bytes());
        assert_eq!(bytes[12], 1);
    }

    #[test]
    fn test_read_back_in_order() {
        let mut writer = RecordWriter::new();
        writer.put_i32(42);
        writer.put_str("wet").expect("short text");
        writer.put_f32(1.5);
        writer
            .put_str_list(&["a".to_string(), "bc".to_string()])
            .expect("short list");
        let bytes = writer.finish();

        let mut reader = RecordReader::new(&bytes);
        assert_eq!(reader.get_i32().expect("i32"), 42);
        assert_eq!(reader.get_str().expect("str"), "wet");
        assert!((reader.get_f32().expect("f32") - 1.5).abs() < f32::EPSILON);
        assert_eq!(reader.get_str_list().expect("list"), vec!["a", "bc"]);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_length_prefix_past_end_is_malformed() {
        // Prefix claims 10 bytes, only 3 follow.
        let bytes = [0u8, 10, b'a', b'b', b'c'];
        let mut reader = RecordReader::new(&bytes);
        assert_eq!(
            reader.get_str(),
            Err(CodecError::MalformedRecord {
                offset: 2,
                needed: 10,
                available: 3,
            })
        );
    }

    #[test]
    fn test_truncated_numeric_is_malformed() {
        let bytes = [0u8, 0, 1];
        let mut reader = RecordReader::new(&bytes);
        assert!(matches!(
            reader.get_i32(),
            Err(CodecError::MalformedRecord { needed: 4, .. })
        ));
    }

    #[test]
    fn test_negative_list_count_is_malformed() {
        let bytes = (-1i32).to_be_bytes();
        let mut reader = RecordReader::new(&bytes);
        assert!(matches!(
            reader.get_str_list(),
            Err(CodecError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = [0u8, 2, 0xFF, 0xFE];
        let mut reader = RecordReader::new(&bytes);
        assert_eq!(reader.get_str(), Err(CodecError::InvalidUtf8 { offset: 2 }));
    }

    #[test]
    fn test_text_longer_than_prefix_rejected() {
        let long = "x".repeat(usize::from(u16::MAX) + 1);
        let mut writer = RecordWriter::new();
        assert!(matches!(
            writer.put_str(&long),
            Err(CodecError::FieldTooLong { .. })
        ));
        assert!(writer.is_empty());
    }
}
