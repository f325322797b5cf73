//! # Shoebox Core
//!
//! Embedded storage engine for the Shoebox photo-sharing client.
//!
//! This crate provides:
//! - An ordered key-value store with transactions, snapshots and
//!   bidirectional iterators, persisted to a checksummed append-only log
//! - Content tables mapping local and server ids to cached entities
//! - FSCK passes that rebuild derived index entries
//! - Domain entities (photos, viewpoints, activities, comments)
//! - Named dispatch queues with cancellable per-component work tracking
//!
//! ## Example
//!
//! ```rust
//! use shoebox_core::Database;
//!
//! let db = Database::open_in_memory().unwrap();
//! let txn = db.new_transaction().unwrap();
//! txn.put(b"greeting", b"hello").unwrap();
//! assert_eq!(db.handle().get(b"greeting").unwrap(), None);
//! txn.commit().unwrap();
//! assert_eq!(db.handle().get(b"greeting").unwrap(), Some(b"hello".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod content;
mod database;
#[cfg(feature = "std")]
mod dir;
pub mod dispatch;
mod error;
pub mod kv;
pub mod metadata;
pub mod model;
mod types;

pub use config::Config;
pub use content::{Content, ContentGuard, ContentHandle, ContentTable, FsckReport, Identity, TableSpec};
pub use database::Database;
#[cfg(feature = "std")]
pub use dir::DatabaseDir;
pub use dispatch::{AsyncState, Dispatcher, Epoch, Queue};
pub use error::{CoreError, CoreResult};
pub use kv::{DbHandle, DbIterator, HandleKind, KeyValue, StoreStats};
pub use types::SequenceNumber;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
