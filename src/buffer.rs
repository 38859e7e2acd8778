//! Validated, bounds-checked access to a graph image
//!
//! A [`Buffer`] holds one complete byte image, either owned in memory or
//! borrowed from a read-only memory mapping, and provides the primitive
//! reads every accessor is built on: bounded slicing, copying record reads,
//! NUL-terminated string reads, and list traversal.
//!
//! All reads are pure and safe. A `Buffer` is immutable after construction
//! and may be shared freely between concurrent readers; it carries no
//! interior mutability and no locks.

use crate::error::{GraphError, Result};
use crate::schema::{Header, HEADER_SIZE};
use memmap2::Mmap;
use std::fmt;
use std::mem;
use zerocopy::FromBytes;

/// Storage for an image - either owned bytes or a memory mapping
enum BufferStorage {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl BufferStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            BufferStorage::Owned(v) => v.as_slice(),
            BufferStorage::Mapped(m) => &m[..],
        }
    }
}

/// A validated graph image
///
/// Construction validates the magic tag, format version, and minimum size;
/// every subsequent read is bounds-checked against the image length.
///
/// # Thread Safety
///
/// `Buffer` is `Send + Sync`. Any number of threads may read one `Buffer`
/// concurrently; there is no reader-side state.
pub struct Buffer {
    storage: BufferStorage,
    header: Header,
}

impl Buffer {
    /// Open an image from owned bytes
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Truncated`] when the image is smaller than the
    /// header, [`GraphError::BadMagic`] or [`GraphError::UnsupportedVersion`]
    /// when the header does not validate.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        Self::from_storage(BufferStorage::Owned(bytes))
    }

    /// Open an image over a read-only memory mapping
    ///
    /// The mapping is held for the buffer's lifetime and released on drop.
    pub(crate) fn from_mmap(mmap: Mmap) -> Result<Self> {
        Self::from_storage(BufferStorage::Mapped(mmap))
    }

    fn from_storage(storage: BufferStorage) -> Result<Self> {
        let data = storage.as_slice();
        if data.len() < HEADER_SIZE {
            return Err(GraphError::Truncated {
                size: data.len(),
                required: HEADER_SIZE,
            });
        }
        let header = Header::read_from_bytes(&data[..HEADER_SIZE]).map_err(|_| {
            GraphError::Truncated {
                size: data.len(),
                required: HEADER_SIZE,
            }
        })?;
        header.validate()?;
        Ok(Self { storage, header })
    }

    /// The full image as a byte slice
    pub fn as_slice(&self) -> &[u8] {
        self.storage.as_slice()
    }

    /// Total image length in bytes
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True when the image holds no bytes (never the case after `open`)
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// A copy of the 32-byte header
    pub fn header(&self) -> Header {
        self.header
    }

    /// Borrow exactly `length` bytes starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::OutOfRange`] when `offset + length` exceeds the
    /// image length.
    pub fn slice(&self, offset: u32, length: u32) -> Result<&[u8]> {
        let data = self.as_slice();
        let start = offset as usize;
        let end = start.checked_add(length as usize).ok_or(GraphError::OutOfRange {
            offset,
            length,
            image_len: data.len(),
        })?;
        if end > data.len() {
            return Err(GraphError::OutOfRange {
                offset,
                length,
                image_len: data.len(),
            });
        }
        Ok(&data[start..end])
    }

    /// Copy a fixed-size record out of the image
    ///
    /// The copy is alignment-free; the record type decides the width.
    pub fn read<T: FromBytes>(&self, offset: u32) -> Result<T> {
        let size = mem::size_of::<T>();
        let bytes = self.slice(offset, size as u32)?;
        T::read_from_bytes(bytes).map_err(|_| GraphError::OutOfRange {
            offset,
            length: size as u32,
            image_len: self.len(),
        })
    }

    /// Copy a record that must live in the record region, past the header
    ///
    /// Record offsets of 0 are the "absent" sentinel and never valid here;
    /// anything below the header size cannot be the start of a record.
    pub fn read_record<T: FromBytes>(&self, offset: u32) -> Result<T> {
        if (offset as usize) < HEADER_SIZE {
            return Err(GraphError::OutOfRange {
                offset,
                length: mem::size_of::<T>() as u32,
                image_len: self.len(),
            });
        }
        self.read(offset)
    }

    /// Borrow a NUL-terminated UTF-8 string starting at `offset`
    ///
    /// The returned slice excludes the terminator.
    ///
    /// # Errors
    ///
    /// [`GraphError::Unterminated`] when no NUL occurs before the end of the
    /// image, [`GraphError::InvalidUtf8`] when the bytes do not decode.
    pub fn read_cstring(&self, offset: u32) -> Result<&str> {
        let data = self.as_slice();
        if offset as usize >= data.len() {
            return Err(GraphError::OutOfRange {
                offset,
                length: 1,
                image_len: data.len(),
            });
        }
        let tail = &data[offset as usize..];
        let nul = memchr::memchr(0, tail).ok_or(GraphError::Unterminated { offset })?;
        std::str::from_utf8(&tail[..nul]).map_err(|_| GraphError::InvalidUtf8 { offset })
    }

    /// Read the leading 32-bit count of a list region
    pub fn list_count(&self, offset: u32) -> Result<u32> {
        let bytes = self.slice(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Borrow the element bytes of a list region
    ///
    /// The returned slice holds exactly `list_count(offset) * element_size`
    /// bytes, starting immediately after the count.
    pub fn list_span(&self, offset: u32, element_size: usize) -> Result<&[u8]> {
        let count = self.list_count(offset)?;
        let byte_len = (count as u64) * (element_size as u64);
        if byte_len > u32::MAX as u64 {
            return Err(GraphError::OutOfRange {
                offset,
                length: u32::MAX,
                image_len: self.len(),
            });
        }
        let elements_offset = offset.checked_add(4).ok_or(GraphError::OutOfRange {
            offset,
            length: 4,
            image_len: self.len(),
        })?;
        self.slice(elements_offset, byte_len as u32)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("header", &self.header)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FORMAT_VERSION, MAGIC};
    use zerocopy::IntoBytes;

    fn minimal_image() -> Vec<u8> {
        let header = Header::new();
        header.as_bytes().to_vec()
    }

    #[test]
    fn open_validates_size() {
        let result = Buffer::open(vec![0u8; 10]);
        assert!(matches!(
            result,
            Err(GraphError::Truncated {
                size: 10,
                required: 32
            })
        ));
    }

    #[test]
    fn open_validates_magic() {
        let mut image = minimal_image();
        image[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(Buffer::open(image), Err(GraphError::BadMagic { .. })));
    }

    #[test]
    fn open_validates_version() {
        let mut image = minimal_image();
        image[4..6].copy_from_slice(&7u16.to_le_bytes());
        assert!(matches!(
            Buffer::open(image),
            Err(GraphError::UnsupportedVersion { found: 7 })
        ));
    }

    #[test]
    fn header_round_trips() {
        let buffer = Buffer::open(minimal_image()).unwrap();
        let header = buffer.header();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version, FORMAT_VERSION);
    }

    #[test]
    fn slice_bounds() {
        let mut image = minimal_image();
        image.extend_from_slice(&[1, 2, 3, 4]);
        let buffer = Buffer::open(image).unwrap();

        assert_eq!(buffer.slice(32, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(buffer.slice(36, 0).unwrap(), &[] as &[u8]);
        assert!(matches!(
            buffer.slice(36, 1),
            Err(GraphError::OutOfRange { .. })
        ));
        assert!(matches!(
            buffer.slice(u32::MAX, 2),
            Err(GraphError::OutOfRange { .. })
        ));
    }

    #[test]
    fn cstring_reads() {
        let mut image = minimal_image();
        image.extend_from_slice(b"hello\0tail");
        let buffer = Buffer::open(image).unwrap();

        assert_eq!(buffer.read_cstring(32).unwrap(), "hello");
        // "tail" runs to the end of the image with no terminator
        assert!(matches!(
            buffer.read_cstring(38),
            Err(GraphError::Unterminated { offset: 38 })
        ));
    }

    #[test]
    fn cstring_rejects_bad_utf8() {
        let mut image = minimal_image();
        image.extend_from_slice(&[0xFF, 0xFE, 0x00]);
        let buffer = Buffer::open(image).unwrap();
        assert!(matches!(
            buffer.read_cstring(32),
            Err(GraphError::InvalidUtf8 { offset: 32 })
        ));
    }

    #[test]
    fn list_span_sizing() {
        let mut image = minimal_image();
        image.extend_from_slice(&3u32.to_le_bytes());
        image.extend_from_slice(&[0u8; 12]);
        let buffer = Buffer::open(image).unwrap();

        assert_eq!(buffer.list_count(32).unwrap(), 3);
        assert_eq!(buffer.list_span(32, 4).unwrap().len(), 12);
        // 3 entries of 8 bytes would run past the image
        assert!(buffer.list_span(32, 8).is_err());
    }

    #[test]
    fn record_region_guard() {
        let mut image = minimal_image();
        image.extend_from_slice(&[0u8; 20]);
        let buffer = Buffer::open(image).unwrap();

        assert!(buffer.read_record::<crate::schema::SymbolNode>(32).is_ok());
        assert!(buffer.read_record::<crate::schema::SymbolNode>(0).is_err());
        assert!(buffer.read_record::<crate::schema::SymbolNode>(16).is_err());
    }
}
