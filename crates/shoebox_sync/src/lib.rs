//! # Shoebox Sync
//!
//! Durable outbound operation queue for Shoebox.
//!
//! Local edits queue a [`NetworkOp`] at a priority. The [`NetworkQueue`]
//! stores entries in the database ordered by priority, then insertion, and
//! keeps one entry per entity so re-queueing moves it. A
//! [`NetworkDriver`] stages one operation per [`OpKind`] at a time, hands it
//! to an [`OperationHandler`] and commits the outcome, backing off per kind
//! on failure.
//!
//! ```rust
//! use shoebox_core::Database;
//! use shoebox_sync::{NetworkOp, NetworkQueue, OpKind};
//!
//! let db = Database::open_in_memory().unwrap();
//! let queue = NetworkQueue::new();
//! queue.add(5, &NetworkOp::new(OpKind::Download), &db.handle()).unwrap();
//! queue.add(1, &NetworkOp::remove_photos([3]), &db.handle()).unwrap();
//!
//! let kinds: Vec<_> = queue
//!     .entries(&db.handle())
//!     .unwrap()
//!     .into_iter()
//!     .map(|e| e.op.kind)
//!     .collect();
//! assert_eq!(kinds, vec![OpKind::RemovePhotos, OpKind::Download]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod driver;
mod error;
mod op;
pub mod queue;

pub use config::RetryConfig;
pub use driver::{NetworkDriver, OperationHandler, PumpReport};
pub use error::{SyncError, SyncResult};
pub use op::{NetworkOp, OpKind, QueueTarget};
pub use queue::{
    NetworkQueue, QueueEntry, QueueIterator, QueuePosition, PRIORITY_DOWNLOAD, PRIORITY_REMOVE_PHOTOS,
    PRIORITY_UPDATE_VIEWPOINT, PRIORITY_UPLOAD_ACTIVITY, PRIORITY_UPLOAD_PHOTO,
};
