//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A fixed-width value had the wrong number of bytes.
    #[error("expected {expected} bytes, got {actual}")]
    UnexpectedLength {
        /// Width of the type being decoded.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// A key ended before all components were read.
    #[error("unexpected end of key")]
    UnexpectedEof,

    /// A key did not start with the expected prefix.
    #[error("key does not start with prefix {prefix:?}")]
    PrefixMismatch {
        /// The prefix that was expected.
        prefix: String,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// Failed to encode a structured message.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a structured message.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
