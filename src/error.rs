//! Error types for the table storage layer.

use std::io;
use std::sync::Arc;

use thiserror::Error as ThisError;

/// The result type used throughout tablestore.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for table, block, cache and memtable operations.
///
/// `Error` is `Clone` so that iterators can latch the first failure they hit
/// and keep reporting it from `status()`.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// An I/O error occurred in the underlying storage.
    #[error("IO error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A block checksum did not match its contents.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The checksum stored in the block trailer.
        expected: u32,
        /// The checksum computed over the block contents.
        actual: u32,
    },

    /// The requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An invalid argument was provided by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not supported by this table format or mode.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The object is in a state that does not allow the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new not supported error.
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Error::NotSupported(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Returns true for corruption and checksum errors.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::ChecksumMismatch { .. })
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}
