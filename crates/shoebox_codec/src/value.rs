//! Typed scalar values stored as key-value payloads.

use crate::error::{CodecError, CodecResult};

/// A type with a fixed binary representation as a stored value.
///
/// Integers and floats are little-endian and fixed-width; strings are raw
/// UTF-8; booleans are a single `0`/`1` byte. Decoding checks the width so a
/// value written as `i32` cannot be silently read back as `i64`.
pub trait TypedValue: Sized {
    /// Encodes the value.
    fn encode_value(&self) -> Vec<u8>;

    /// Decodes a value previously produced by [`TypedValue::encode_value`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes have the wrong width or content.
    fn decode_value(bytes: &[u8]) -> CodecResult<Self>;
}

macro_rules! fixed_width_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl TypedValue for $ty {
                fn encode_value(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }

                fn decode_value(bytes: &[u8]) -> CodecResult<Self> {
                    const WIDTH: usize = std::mem::size_of::<$ty>();
                    let array: [u8; WIDTH] =
                        bytes.try_into().map_err(|_| CodecError::UnexpectedLength {
                            expected: WIDTH,
                            actual: bytes.len(),
                        })?;
                    Ok(<$ty>::from_le_bytes(array))
                }
            }
        )*
    };
}

fixed_width_value!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl TypedValue for bool {
    fn encode_value(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }

    fn decode_value(bytes: &[u8]) -> CodecResult<Self> {
        match bytes {
            [0] => Ok(false),
            [1] => Ok(true),
            [b] => Err(CodecError::InvalidBool(*b)),
            _ => Err(CodecError::UnexpectedLength {
                expected: 1,
                actual: bytes.len(),
            }),
        }
    }
}

impl TypedValue for String {
    fn encode_value(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode_value(bytes: &[u8]) -> CodecResult<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

impl TypedValue for Vec<u8> {
    fn encode_value(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode_value(bytes: &[u8]) -> CodecResult<Self> {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip<T: TypedValue + PartialEq + std::fmt::Debug>(v: T) {
        assert_eq!(T::decode_value(&v.encode_value()).unwrap(), v);
    }

    #[test]
    fn integers_of_every_width() {
        roundtrip(i8::MIN);
        roundtrip(i16::MAX);
        roundtrip(-123_456_i32);
        roundtrip(i64::MIN);
        roundtrip(u8::MAX);
        roundtrip(65_535_u16);
        roundtrip(u32::MAX);
        roundtrip(u64::MAX);
    }

    #[test]
    fn floats_and_strings() {
        let f = f32::decode_value(&1.25_f32.encode_value()).unwrap();
        assert!((f - 1.25).abs() < f32::EPSILON);
        roundtrip(std::f64::consts::PI);
        roundtrip(String::from("héllo"));
        roundtrip(true);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let bytes = 7_i32.encode_value();
        assert_eq!(
            i64::decode_value(&bytes),
            Err(CodecError::UnexpectedLength {
                expected: 8,
                actual: 4
            })
        );
        assert_eq!(bool::decode_value(&[2]), Err(CodecError::InvalidBool(2)));
        assert_eq!(
            String::decode_value(&[0xff, 0xfe]),
            Err(CodecError::InvalidUtf8)
        );
    }

    proptest! {
        #[test]
        fn any_i64_roundtrips(v in any::<i64>()) {
            prop_assert_eq!(i64::decode_value(&v.encode_value()).unwrap(), v);
        }

        #[test]
        fn any_f32_roundtrips_within_epsilon(v in -1e6f32..1e6) {
            let back = f32::decode_value(&v.encode_value()).unwrap();
            prop_assert!((back - v).abs() <= f32::EPSILON * v.abs().max(1.0));
        }
    }
}
