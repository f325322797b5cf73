//! Order-preserving key composition.
//!
//! Keys are built from a short ASCII prefix followed by fixed-width,
//! big-endian components. Signed integers have their sign bit flipped and
//! floats use the usual total-order bit trick, so bytewise comparison of
//! two encoded keys matches the numeric comparison of their components.
//!
//! Strings come in two forms: [`KeyBuilder::str`] escapes `0x00` and
//! terminates the component so more fields may follow, while
//! [`KeyBuilder::tail_str`] appends raw bytes and must be the last
//! component.

use crate::error::{CodecError, CodecResult};

const SIGN_64: u64 = 1 << 63;
const SIGN_32: u32 = 1 << 31;
const ESCAPE: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Builds an ordered key component by component.
#[derive(Debug, Clone, Default)]
pub struct KeyBuilder {
    buf: Vec<u8>,
}

impl KeyBuilder {
    /// Starts a key with the given ASCII prefix.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            buf: prefix.as_bytes().to_vec(),
        }
    }

    /// Appends an unsigned 64-bit component.
    #[must_use]
    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Appends a signed 64-bit component.
    #[must_use]
    pub fn i64(self, v: i64) -> Self {
        self.u64((v as u64) ^ SIGN_64)
    }

    /// Appends an unsigned 32-bit component.
    #[must_use]
    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Appends a signed 32-bit component.
    #[must_use]
    pub fn i32(self, v: i32) -> Self {
        self.u32((v as u32) ^ SIGN_32)
    }

    /// Appends a float component. `-0.0` sorts before `0.0`; NaNs sort last.
    #[must_use]
    pub fn f64(self, v: f64) -> Self {
        let bits = v.to_bits();
        let ordered = if bits & SIGN_64 != 0 {
            !bits
        } else {
            bits | SIGN_64
        };
        self.u64(ordered)
    }

    /// Appends an escaped, terminated string component.
    #[must_use]
    pub fn str(mut self, s: &str) -> Self {
        for &b in s.as_bytes() {
            self.buf.push(b);
            if b == ESCAPE {
                self.buf.push(ESCAPED_NUL);
            }
        }
        self.buf.push(ESCAPE);
        self.buf.push(TERMINATOR);
        self
    }

    /// Appends raw string bytes. Must be the final component.
    #[must_use]
    pub fn tail_str(mut self, s: &str) -> Self {
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Appends raw bytes.
    #[must_use]
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Finishes the key.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads components back out of a key built with [`KeyBuilder`].
#[derive(Debug, Clone)]
pub struct KeyReader<'a> {
    rest: &'a [u8],
}

impl<'a> KeyReader<'a> {
    /// Creates a reader over `key`.
    #[must_use]
    pub fn new(key: &'a [u8]) -> Self {
        Self { rest: key }
    }

    /// Consumes `prefix`, failing if the key does not start with it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::PrefixMismatch`] on mismatch.
    pub fn expect_prefix(&mut self, prefix: &str) -> CodecResult<()> {
        match self.rest.strip_prefix(prefix.as_bytes()) {
            Some(rest) => {
                self.rest = rest;
                Ok(())
            }
            None => Err(CodecError::PrefixMismatch {
                prefix: prefix.to_string(),
            }),
        }
    }

    fn take<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        if self.rest.len() < N {
            return Err(CodecError::UnexpectedEof);
        }
        let (head, rest) = self.rest.split_at(N);
        self.rest = rest;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        Ok(out)
    }

    /// Reads an unsigned 64-bit component.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] if fewer than 8 bytes remain.
    pub fn u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_be_bytes(self.take::<8>()?))
    }

    /// Reads a signed 64-bit component.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] if fewer than 8 bytes remain.
    pub fn i64(&mut self) -> CodecResult<i64> {
        Ok((self.u64()? ^ SIGN_64) as i64)
    }

    /// Reads an unsigned 32-bit component.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] if fewer than 4 bytes remain.
    pub fn u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_be_bytes(self.take::<4>()?))
    }

    /// Reads a signed 32-bit component.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] if fewer than 4 bytes remain.
    pub fn i32(&mut self) -> CodecResult<i32> {
        Ok((self.u32()? ^ SIGN_32) as i32)
    }

    /// Reads a float component.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] if fewer than 8 bytes remain.
    pub fn f64(&mut self) -> CodecResult<f64> {
        let ordered = self.u64()?;
        let bits = if ordered & SIGN_64 != 0 {
            ordered & !SIGN_64
        } else {
            !ordered
        };
        Ok(f64::from_bits(bits))
    }

    /// Reads an escaped, terminated string component.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminator is missing or the bytes are not
    /// valid UTF-8.
    pub fn str(&mut self) -> CodecResult<String> {
        let mut out = Vec::new();
        let mut i = 0;
        loop {
            let b = *self.rest.get(i).ok_or(CodecError::UnexpectedEof)?;
            if b != ESCAPE {
                out.push(b);
                i += 1;
                continue;
            }
            match self.rest.get(i + 1) {
                Some(&ESCAPED_NUL) => {
                    out.push(ESCAPE);
                    i += 2;
                }
                Some(&TERMINATOR) => {
                    self.rest = &self.rest[i + 2..];
                    return String::from_utf8(out).map_err(|_| CodecError::InvalidUtf8);
                }
                _ => return Err(CodecError::UnexpectedEof),
            }
        }
    }

    /// Reads the remaining bytes as a string.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidUtf8`] if the tail is not UTF-8.
    pub fn tail_str(&mut self) -> CodecResult<String> {
        let s = std::str::from_utf8(self.rest).map_err(|_| CodecError::InvalidUtf8)?;
        self.rest = &[];
        Ok(s.to_string())
    }

    /// Returns the unread bytes.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        self.rest
    }

    /// Returns true once every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }
}

/// Returns the smallest key greater than every key starting with `prefix`,
/// or `None` if no such key exists (prefix is empty or all `0xFF`).
#[must_use]
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn prefix_successor_increments_last_byte() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(&[b'a', 0xFF]), Some(b"b".to_vec()));
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_successor(b""), None);
    }

    #[test]
    fn escaped_strings_keep_following_fields() {
        let key = KeyBuilder::with_prefix("x/")
            .str("a\0b")
            .i64(-3)
            .build();
        let mut r = KeyReader::new(&key);
        r.expect_prefix("x/").unwrap();
        assert_eq!(r.str().unwrap(), "a\0b");
        assert_eq!(r.i64().unwrap(), -3);
        assert!(r.is_empty());
    }

    #[test]
    fn wrong_prefix_is_reported() {
        let key = KeyBuilder::with_prefix("p/").u64(1).build();
        let mut r = KeyReader::new(&key);
        assert!(matches!(
            r.expect_prefix("q/"),
            Err(CodecError::PrefixMismatch { .. })
        ));
    }

    #[test]
    fn truncated_key_is_eof() {
        let key = KeyBuilder::with_prefix("p/").u32(9).build();
        let mut r = KeyReader::new(&key[..4]);
        r.expect_prefix("p/").unwrap();
        assert_eq!(r.u32(), Err(CodecError::UnexpectedEof));
    }

    proptest! {
        #[test]
        fn i64_order_matches_byte_order(a in any::<i64>(), b in any::<i64>()) {
            let ka = KeyBuilder::default().i64(a).build();
            let kb = KeyBuilder::default().i64(b).build();
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }

        #[test]
        fn i32_order_matches_byte_order(a in any::<i32>(), b in any::<i32>()) {
            let ka = KeyBuilder::default().i32(a).build();
            let kb = KeyBuilder::default().i32(b).build();
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }

        #[test]
        fn f64_order_matches_byte_order(a in -1e12f64..1e12, b in -1e12f64..1e12) {
            // collapse -0.0, which sorts before 0.0 but compares equal
            let (a, b) = (a + 0.0, b + 0.0);
            let ka = KeyBuilder::default().f64(a).build();
            let kb = KeyBuilder::default().f64(b).build();
            prop_assert_eq!(a.partial_cmp(&b).unwrap(), ka.cmp(&kb));
            prop_assert_eq!(KeyReader::new(&ka).f64().unwrap(), a);
        }

        #[test]
        fn escaped_string_order_matches(a in ".{0,8}", b in ".{0,8}") {
            let ka = KeyBuilder::default().str(&a).build();
            let kb = KeyBuilder::default().str(&b).build();
            prop_assert_eq!(a.as_bytes().cmp(b.as_bytes()), ka.cmp(&kb));
        }
    }
}
