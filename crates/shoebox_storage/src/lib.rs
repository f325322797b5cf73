//! # Shoebox Storage
//!
//! Durable byte logs underneath the Shoebox key-value engine.
//!
//! The key-value engine in `shoebox_core` keeps its working set in memory
//! and persists every committed batch as one framed record appended to a
//! [`LogBackend`]. Backends never interpret those records; framing,
//! checksums and replay all live in the engine.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral stores and tests (with fault injection)
//! - [`FileBackend`] - a single append-only file
//!
//! ## Example
//!
//! ```rust
//! use shoebox_storage::{LogBackend, InMemoryBackend};
//!
//! let mut log = InMemoryBackend::new();
//! let offset = log.append(b"batch-1").unwrap();
//! assert_eq!(log.read_at(offset, 7).unwrap(), b"batch-1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::LogBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::{FaultSwitch, InMemoryBackend};
