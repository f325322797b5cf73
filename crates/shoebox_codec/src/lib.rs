//! # Shoebox Codec
//!
//! Binary codecs shared by the Shoebox storage engine and everything built
//! on it.
//!
//! - [`key`]: order-preserving key composition. Encoded integers compare
//!   bytewise in the same order as their numeric values, so index keys made
//!   of `prefix + fields + id` can be range-scanned.
//! - [`TypedValue`]: fixed-width little-endian scalars and UTF-8 strings
//!   stored as values.
//! - [`to_message`] / [`from_message`]: structured records as CBOR via serde.
//!
//! ## Usage
//!
//! ```
//! use shoebox_codec::{KeyBuilder, KeyReader, TypedValue};
//!
//! let key = KeyBuilder::with_prefix("nq/").i32(-5).u64(7).build();
//! let mut reader = KeyReader::new(&key);
//! reader.expect_prefix("nq/").unwrap();
//! assert_eq!(reader.i32().unwrap(), -5);
//! assert_eq!(reader.u64().unwrap(), 7);
//!
//! let bytes = 42i64.encode_value();
//! assert_eq!(i64::decode_value(&bytes).unwrap(), 42);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod key;
mod message;
mod value;

pub use error::{CodecError, CodecResult};
pub use key::{prefix_successor, KeyBuilder, KeyReader};
pub use message::{from_message, to_message};
pub use value::TypedValue;
