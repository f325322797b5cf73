//! # Shoebox Testkit
//!
//! Test utilities for Shoebox.
//!
//! This crate provides:
//! - Database fixtures backed by memory, temp directories or a
//!   fault-injecting log
//! - Property-based generators for key-value operation sequences, with a
//!   reference model to check results against
//! - Helpers that damage a log file the way a crash would
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shoebox_testkit::prelude::*;
//!
//! #[test]
//! fn survives_restart() {
//!     let db = TestDatabase::file();
//!     db.handle().put(b"k", b"v").unwrap();
//!     let db = db.reopen();
//!     assert!(db.handle().exists(b"k").unwrap());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
