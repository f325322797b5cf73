//! Error types for Shoebox core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Shoebox core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Log backend error.
    #[error("storage error: {0}")]
    Storage(#[from] shoebox_storage::StorageError),

    /// Key or value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] shoebox_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The commit log is corrupted beyond its tail.
    #[error("log corruption: {message}")]
    LogCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// The transaction was already committed or abandoned.
    #[error("transaction already closed")]
    TransactionClosed,

    /// A write was attempted through a snapshot handle.
    #[error("snapshot handles are read-only")]
    ReadOnlyHandle,

    /// An entity identity changed in a way other than a first server id
    /// assignment.
    #[error("invalid identity transition from {from} to {to}")]
    InvalidIdentityTransition {
        /// Identity as last saved.
        from: String,
        /// Identity being saved.
        to: String,
    },

    /// Database is already open in another process.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Invalid database format or version.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a log corruption error.
    pub fn log_corruption(message: impl Into<String>) -> Self {
        Self::LogCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
