//! Error types for log backends.

use std::io;
use thiserror::Error;

/// Result type for log backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or appending to a log.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the log.
    #[error("read beyond end of log: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current log size.
        size: u64,
    },

    /// Truncation was asked to grow the log.
    #[error("cannot truncate log of size {size} to larger size {requested}")]
    TruncateBeyondEnd {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// A write was rejected by an injected fault.
    #[error("injected write fault")]
    InjectedFault,
}
