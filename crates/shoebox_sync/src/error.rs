//! Error types for the network queue and driver.

use shoebox_codec::CodecError;
use shoebox_core::CoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while queueing or sending operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Database error while reading or updating the queue.
    #[error("database error: {0}")]
    Database(#[from] CoreError),

    /// Network or transport error reported by the operation handler.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A queue record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The operation was cancelled, typically by a logout.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failed operation should stay queued for retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Database(CoreError::Storage(_) | CoreError::Io(_)) => true,
            _ => false,
        }
    }
}
