/// Error types for the cognigraph library
use crate::schema::ValueKind;
use std::fmt;
use std::io;

/// Result type alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Main error type for graph operations
///
/// Every failure in the library is reported through this enum and is
/// recoverable at the call site. Accessor escape (use after the buffer is
/// gone) has no variant: accessors borrow from the `Buffer`, so the borrow
/// checker rejects it at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// The image does not start with the expected magic tag
    BadMagic {
        /// Value found at offset 0
        found: u32,
    },

    /// The image declares a format version this reader does not understand
    UnsupportedVersion {
        /// Version found in the header
        found: u16,
    },

    /// The image is smaller than a structure it must contain
    Truncated {
        /// Actual size in bytes
        size: usize,
        /// Minimum required size in bytes
        required: usize,
    },

    /// An offset/length pair reaches outside the image
    OutOfRange {
        /// Requested byte offset
        offset: u32,
        /// Requested length in bytes
        length: u32,
        /// Total image length
        image_len: usize,
    },

    /// A string has no NUL terminator before the end of the image
    Unterminated {
        /// Offset where the string starts
        offset: u32,
    },

    /// A typed value read did not match the stored value kind
    TypeMismatch {
        /// Kind the caller asked for
        expected: ValueKind,
        /// Kind actually stored
        found: ValueKind,
    },

    /// String bytes are not valid UTF-8
    InvalidUtf8 {
        /// Offset where the string starts
        offset: u32,
    },

    /// A caller-supplied argument or a stored tag is invalid
    InvalidArgument(String),

    /// A requested entity (property key, root node) does not exist
    NotFound(String),

    /// I/O errors
    Io(String),

    /// A builder operation arrived in the wrong state (e.g. building twice)
    BuilderState(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::BadMagic { found } => {
                write!(f, "Invalid magic tag: 0x{:08X}", found)
            }
            GraphError::UnsupportedVersion { found } => {
                write!(f, "Unsupported format version: {}", found)
            }
            GraphError::Truncated { size, required } => {
                write!(
                    f,
                    "Image too small: {} bytes (need at least {})",
                    size, required
                )
            }
            GraphError::OutOfRange {
                offset,
                length,
                image_len,
            } => {
                write!(
                    f,
                    "Out of range: {} bytes at offset {} in a {}-byte image",
                    length, offset, image_len
                )
            }
            GraphError::Unterminated { offset } => {
                write!(f, "Unterminated string at offset {}", offset)
            }
            GraphError::TypeMismatch { expected, found } => {
                write!(
                    f,
                    "Type mismatch: expected {:?}, found {:?}",
                    expected, found
                )
            }
            GraphError::InvalidUtf8 { offset } => {
                write!(f, "Invalid UTF-8 in string at offset {}", offset)
            }
            GraphError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            GraphError::NotFound(msg) => write!(f, "Not found: {}", msg),
            GraphError::Io(msg) => write!(f, "I/O error: {}", msg),
            GraphError::BuilderState(msg) => write!(f, "Builder state error: {}", msg),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<io::Error> for GraphError {
    fn from(err: io::Error) -> Self {
        GraphError::Io(err.to_string())
    }
}
