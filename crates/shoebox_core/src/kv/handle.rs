//! Client-facing store handles.

use crate::error::{CoreError, CoreResult};
use crate::kv::iterator::DbIterator;
use crate::kv::store::{BatchEntry, Direction, KeyValue, ReadPoint, Store};
use crate::types::SequenceNumber;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shoebox_codec::{from_message, prefix_successor, to_message, TypedValue};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

/// What a [`DbHandle`] reads from and writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// Reads the latest committed state; every write commits on its own.
    Direct,
    /// Buffers writes until [`DbHandle::commit`]; reads see those writes.
    Transaction,
    /// Read-only view frozen at creation.
    Snapshot,
}

/// A connection to the store.
///
/// Handles are cheap to clone. Clones of a transaction handle share the same
/// pending writes, and clones of a snapshot handle share the same frozen
/// view.
///
/// ```
/// use shoebox_core::Database;
///
/// let db = Database::open_in_memory().unwrap();
/// let txn = db.new_transaction().unwrap();
/// txn.put("greeting", "hello").unwrap();
///
/// assert_eq!(txn.get("greeting").unwrap(), Some(b"hello".to_vec()));
/// assert_eq!(db.handle().get("greeting").unwrap(), None);
///
/// txn.commit().unwrap();
/// assert_eq!(db.handle().get("greeting").unwrap(), Some(b"hello".to_vec()));
/// ```
#[derive(Clone)]
pub struct DbHandle {
    store: Arc<Store>,
    kind: Kind,
}

#[derive(Clone)]
enum Kind {
    Direct,
    Transaction(Arc<TxnState>),
    Snapshot(Arc<SnapshotPin>),
}

struct TxnState {
    pending: Mutex<PendingWrites>,
}

#[derive(Default)]
struct PendingWrites {
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    closed: bool,
}

impl PendingWrites {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed {
            Err(CoreError::TransactionClosed)
        } else {
            Ok(())
        }
    }

    fn neighbor(&self, from: Bound<&[u8]>, dir: Direction) -> Option<(&Vec<u8>, &Option<Vec<u8>>)> {
        match dir {
            Direction::Forward => self
                .writes
                .range::<[u8], _>((from, Bound::Unbounded))
                .next(),
            Direction::Reverse => self
                .writes
                .range::<[u8], _>((Bound::Unbounded, from))
                .next_back(),
        }
    }
}

impl Drop for TxnState {
    fn drop(&mut self) {
        let pending = self.pending.get_mut();
        if !pending.closed && !pending.writes.is_empty() {
            debug!(
                writes = pending.writes.len(),
                "abandoning dropped transaction"
            );
        }
    }
}

struct SnapshotPin {
    store: Arc<Store>,
    seq: u64,
}

impl Drop for SnapshotPin {
    fn drop(&mut self) {
        self.store.release_snapshot(self.seq);
    }
}

impl DbHandle {
    pub(crate) fn direct(store: Arc<Store>) -> Self {
        Self {
            store,
            kind: Kind::Direct,
        }
    }

    /// Returns what this handle is.
    #[must_use]
    pub fn kind(&self) -> HandleKind {
        match self.kind {
            Kind::Direct => HandleKind::Direct,
            Kind::Transaction(_) => HandleKind::Transaction,
            Kind::Snapshot(_) => HandleKind::Snapshot,
        }
    }

    /// Returns true for transaction handles.
    #[must_use]
    pub fn is_transaction(&self) -> bool {
        matches!(self.kind, Kind::Transaction(_))
    }

    /// Returns true for snapshot handles.
    #[must_use]
    pub fn is_snapshot(&self) -> bool {
        matches!(self.kind, Kind::Snapshot(_))
    }

    fn read_point(&self) -> ReadPoint {
        match &self.kind {
            Kind::Snapshot(pin) => ReadPoint::At(pin.seq),
            _ => ReadPoint::Latest,
        }
    }

    // Reads

    /// Reads the value stored under `key`.
    pub fn get(&self, key: impl AsRef<[u8]>) -> CoreResult<Option<Vec<u8>>> {
        let key = key.as_ref();
        if let Kind::Transaction(txn) = &self.kind {
            let pending = txn.pending.lock();
            pending.ensure_open()?;
            if let Some(write) = pending.writes.get(key) {
                return Ok(write.clone());
            }
        }
        Ok(self.store.get(key, self.read_point()))
    }

    /// Returns true if `key` holds a value.
    pub fn exists(&self, key: impl AsRef<[u8]>) -> CoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Reads and decodes a scalar value.
    pub fn get_value<T: TypedValue>(&self, key: impl AsRef<[u8]>) -> CoreResult<Option<T>> {
        self.get(key)?
            .map(|bytes| T::decode_value(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Reads and decodes a CBOR message.
    pub fn get_message<T: DeserializeOwned>(&self, key: impl AsRef<[u8]>) -> CoreResult<Option<T>> {
        self.get(key)?
            .map(|bytes| from_message(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    // Writes

    /// Stores `value` under `key`.
    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> CoreResult<()> {
        self.write(key.as_ref().to_vec(), Some(value.as_ref().to_vec()))
    }

    /// Encodes and stores a scalar value.
    pub fn put_value<T: TypedValue>(&self, key: impl AsRef<[u8]>, value: &T) -> CoreResult<()> {
        self.write(key.as_ref().to_vec(), Some(value.encode_value()))
    }

    /// Encodes and stores a CBOR message.
    pub fn put_message<T: Serialize + ?Sized>(&self, key: impl AsRef<[u8]>, message: &T) -> CoreResult<()> {
        let bytes = to_message(message)?;
        self.write(key.as_ref().to_vec(), Some(bytes))
    }

    /// Deletes `key`. Deleting a missing key is not an error.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> CoreResult<()> {
        self.write(key.as_ref().to_vec(), None)
    }

    fn write(&self, key: Vec<u8>, value: Option<Vec<u8>>) -> CoreResult<()> {
        match &self.kind {
            Kind::Direct => self.store.commit(vec![(key, value)]).map(|_| ()),
            Kind::Snapshot(_) => Err(CoreError::ReadOnlyHandle),
            Kind::Transaction(txn) => {
                let mut pending = txn.pending.lock();
                pending.ensure_open()?;
                pending.writes.insert(key, value);
                Ok(())
            }
        }
    }

    // Iteration

    /// Returns an unpositioned cursor over this handle's view.
    #[must_use]
    pub fn iter(&self) -> DbIterator {
        DbIterator::new(self.clone())
    }

    /// Returns a cursor positioned on the last key, for reverse traversal.
    pub fn reverse_iter(&self) -> CoreResult<DbIterator> {
        let mut iter = self.iter();
        iter.seek_to_last()?;
        Ok(iter)
    }

    /// Collects every entry whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: impl AsRef<[u8]>) -> CoreResult<Vec<KeyValue>> {
        let prefix = prefix.as_ref();
        let mut out = Vec::new();
        let mut iter = self.iter();
        iter.seek(prefix)?;
        while iter.valid() && iter.key().starts_with(prefix) {
            out.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.next()?;
        }
        Ok(out)
    }

    /// Counts entries whose key starts with `prefix`.
    pub fn count_prefix(&self, prefix: impl AsRef<[u8]>) -> CoreResult<usize> {
        let prefix = prefix.as_ref();
        let mut count = 0;
        let mut iter = self.iter();
        iter.seek(prefix)?;
        while iter.valid() && iter.key().starts_with(prefix) {
            count += 1;
            iter.next()?;
        }
        Ok(count)
    }

    /// Returns the first live entry strictly beyond `from` in `dir`, merging
    /// pending writes over the base view.
    pub(crate) fn step(&self, from: Bound<&[u8]>, dir: Direction) -> CoreResult<Option<KeyValue>> {
        let at = self.read_point();
        let Kind::Transaction(txn) = &self.kind else {
            return Ok(self.store.neighbor(from, dir, at));
        };

        let pending = txn.pending.lock();
        pending.ensure_open()?;

        let mut from: Bound<Vec<u8>> = from.map(<[u8]>::to_vec);
        loop {
            let bound = from.as_ref().map(Vec::as_slice);
            let base = self.store.neighbor(bound, dir, at);
            let Some((key, write)) = pending.neighbor(bound, dir) else {
                return Ok(base);
            };
            let overlay_first = base
                .as_ref()
                .map_or(true, |(base_key, _)| dir.reaches_first(key, base_key));
            if !overlay_first {
                return Ok(base);
            }
            match write {
                Some(value) => return Ok(Some((key.clone(), value.clone()))),
                // Pending delete hides the base key; keep looking past it.
                None => from = Bound::Excluded(key.clone()),
            }
        }
    }

    /// Returns the last live entry whose key starts with `prefix`.
    pub fn last_with_prefix(&self, prefix: impl AsRef<[u8]>) -> CoreResult<Option<KeyValue>> {
        let prefix = prefix.as_ref();
        let upper = prefix_successor(prefix);
        let from = match &upper {
            Some(upper) => Bound::Excluded(upper.as_slice()),
            None => Bound::Unbounded,
        };
        Ok(self
            .step(from, Direction::Reverse)?
            .filter(|(key, _)| key.starts_with(prefix)))
    }

    // Transactions and snapshots

    /// Starts a transaction over the latest committed state.
    ///
    /// # Errors
    ///
    /// Transactions do not nest: fails with `InvalidOperation` on a
    /// transaction handle and with `ReadOnlyHandle` on a snapshot.
    pub fn new_transaction(&self) -> CoreResult<DbHandle> {
        match &self.kind {
            Kind::Direct => Ok(Self {
                store: Arc::clone(&self.store),
                kind: Kind::Transaction(Arc::new(TxnState {
                    pending: Mutex::new(PendingWrites::default()),
                })),
            }),
            Kind::Transaction(_) => Err(CoreError::invalid_operation(
                "transactions cannot be nested",
            )),
            Kind::Snapshot(_) => Err(CoreError::ReadOnlyHandle),
        }
    }

    /// Freezes the current committed state.
    ///
    /// A snapshot of a transaction handle does not include its pending
    /// writes. A snapshot of a snapshot is the same view.
    #[must_use]
    pub fn new_snapshot(&self) -> DbHandle {
        if let Kind::Snapshot(_) = self.kind {
            return self.clone();
        }
        let seq = self.store.acquire_snapshot();
        Self {
            store: Arc::clone(&self.store),
            kind: Kind::Snapshot(Arc::new(SnapshotPin {
                store: Arc::clone(&self.store),
                seq,
            })),
        }
    }

    /// Number of buffered writes; always 0 outside a transaction.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        match &self.kind {
            Kind::Transaction(txn) => txn.pending.lock().writes.len(),
            _ => 0,
        }
    }

    /// Atomically applies the pending writes.
    ///
    /// If the log append fails, nothing is applied and the transaction stays
    /// open so the caller can retry or abandon it. An empty transaction
    /// closes without writing and returns the current committed sequence.
    ///
    /// # Errors
    ///
    /// `TransactionClosed` if already committed or abandoned;
    /// `InvalidOperation` on a non-transaction handle; storage errors from the
    /// log append.
    pub fn commit(&self) -> CoreResult<SequenceNumber> {
        let Kind::Transaction(txn) = &self.kind else {
            return Err(CoreError::invalid_operation(
                "commit requires a transaction handle",
            ));
        };
        let mut pending = txn.pending.lock();
        pending.ensure_open()?;

        if pending.writes.is_empty() {
            pending.closed = true;
            return Ok(self.store.committed_seq());
        }

        let entries: Vec<BatchEntry> = pending
            .writes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let seq = self.store.commit(entries)?;
        pending.writes.clear();
        pending.closed = true;
        Ok(seq)
    }

    /// Discards the pending writes and closes the transaction.
    pub fn abandon(&self) -> CoreResult<()> {
        let Kind::Transaction(txn) = &self.kind else {
            return Err(CoreError::invalid_operation(
                "abandon requires a transaction handle",
            ));
        };
        let mut pending = txn.pending.lock();
        pending.ensure_open()?;
        pending.writes.clear();
        pending.closed = true;
        Ok(())
    }
}

impl fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbHandle")
            .field("kind", &self.kind())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
