//! Ordered key-value storage with transactions and snapshots.
//!
//! The store keeps every key in memory as a chain of versions and persists
//! committed batches to a [`LogBackend`](shoebox_storage::LogBackend). Opening
//! a store replays the log.
//!
//! Three handle kinds share one store:
//!
//! | Kind | Reads | Writes |
//! |------|-------|--------|
//! | Direct | latest committed | commit immediately |
//! | Transaction | pending writes over latest committed | buffered until commit |
//! | Snapshot | committed state at creation | rejected |

mod handle;
mod iterator;
pub(crate) mod record;
pub(crate) mod store;

pub use handle::{DbHandle, HandleKind};
pub use iterator::DbIterator;
pub use record::{BatchRecord, Decoded};
pub use store::{KeyValue, StoreStats};
