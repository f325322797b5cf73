//! Structured records encoded as CBOR.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes a record to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn to_message<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

/// Deserializes a record from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the bytes are not a valid
/// encoding of `T`.
pub fn from_message<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Caption {
        id: i64,
        text: String,
        tags: Vec<String>,
    }

    #[test]
    fn record_roundtrip() {
        let caption = Caption {
            id: 9,
            text: "beach".into(),
            tags: vec!["summer".into()],
        };
        let bytes = to_message(&caption).unwrap();
        let back: Caption = from_message(&bytes).unwrap();
        assert_eq!(back, caption);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let result: CodecResult<Caption> = from_message(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }
}
