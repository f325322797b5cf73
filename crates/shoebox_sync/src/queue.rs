//! Durable priority queue of outbound operations.
//!
//! Key layout:
//!
//! ```text
//! nq/<priority i32><sequence u64>   → CBOR NetworkOp
//! nqi/<table>/<local id i64>        → CBOR QueuePosition of the target's entry
//! ```
//!
//! Both integers use the order-preserving key encoding, so a forward scan of
//! `nq/` yields entries by ascending priority and, within a priority band,
//! in insertion order.

use crate::error::SyncResult;
use crate::op::{NetworkOp, OpKind, QueueTarget};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shoebox_codec::{from_message, to_message, CodecError, CodecResult, KeyBuilder, KeyReader};
use shoebox_core::model::{Activity, Photo, Viewpoint, ACTIVITY_TABLE, PHOTO_TABLE, VIEWPOINT_TABLE};
use shoebox_core::{metadata, DbHandle, DbIterator};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Prefix of queue entries.
pub const QUEUE_PREFIX: &str = "nq/";
/// Prefix of the per-entity index.
pub const QUEUE_INDEX_PREFIX: &str = "nqi/";

/// Priority of server state downloads.
pub const PRIORITY_DOWNLOAD: i32 = 100;
/// Priority of viewpoint updates.
pub const PRIORITY_UPDATE_VIEWPOINT: i32 = 200;
/// Priority of activity uploads.
pub const PRIORITY_UPLOAD_ACTIVITY: i32 = 300;
/// Priority of photo uploads.
pub const PRIORITY_UPLOAD_PHOTO: i32 = 400;
/// Priority of photo removals.
pub const PRIORITY_REMOVE_PHOTOS: i32 = 500;

/// Where an entry sits in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueuePosition {
    /// Lower runs sooner.
    pub priority: i32,
    /// Strictly increasing across the queue.
    pub sequence: u64,
}

impl QueuePosition {
    /// Encoded entry key.
    pub fn key(&self) -> Vec<u8> {
        KeyBuilder::with_prefix(QUEUE_PREFIX)
            .i32(self.priority)
            .u64(self.sequence)
            .build()
    }

    /// Parses an entry key.
    pub fn decode_key(key: &[u8]) -> CodecResult<Self> {
        let mut reader = KeyReader::new(key);
        reader.expect_prefix(QUEUE_PREFIX)?;
        let priority = reader.i32()?;
        let sequence = reader.u64()?;
        if !reader.is_empty() {
            return Err(CodecError::UnexpectedLength {
                expected: key.len() - reader.remaining().len(),
                actual: key.len(),
            });
        }
        Ok(Self { priority, sequence })
    }
}

/// A decoded queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Position in the queue.
    pub position: QueuePosition,
    /// Operation to perform.
    pub op: NetworkOp,
}

impl QueueEntry {
    fn decode(key: &[u8], value: &[u8]) -> CodecResult<Self> {
        Ok(Self {
            position: QueuePosition::decode_key(key)?,
            op: from_message(value)?,
        })
    }

    /// Entry priority.
    pub fn priority(&self) -> i32 {
        self.position.priority
    }

    /// Entry sequence number.
    pub fn sequence(&self) -> u64 {
        self.position.sequence
    }
}

fn index_key(target: &QueueTarget) -> Vec<u8> {
    KeyBuilder::with_prefix(&format!("{QUEUE_INDEX_PREFIX}{}/", target.table))
        .i64(target.local_id)
        .build()
}

/// The outbound operation queue.
///
/// Entries live in the database, so every mutation takes an `updates`
/// handle and becomes durable when the caller commits it. The queue object
/// itself only caches the sequence counter and the staged operations.
#[derive(Debug, Default)]
pub struct NetworkQueue {
    next_sequence: Mutex<Option<u64>>,
    staged: Mutex<HashMap<OpKind, QueueEntry>>,
}

impl NetworkQueue {
    /// Creates a queue with nothing staged.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_sequence(&self, updates: &DbHandle) -> SyncResult<u64> {
        let mut next = self.next_sequence.lock();
        let stored = metadata::network_queue_seq(updates)?;
        let cached = match *next {
            Some(seq) => seq,
            None => {
                // Concurrent transactions can commit the counter out of
                // order; never hand out a sequence still present in the queue.
                let mut after_last = 1;
                for entry in self.entries(updates)? {
                    after_last = after_last.max(entry.sequence() + 1);
                }
                after_last
            }
        };
        let sequence = stored.max(cached);
        metadata::set_network_queue_seq(updates, sequence + 1)?;
        *next = Some(sequence + 1);
        Ok(sequence)
    }

    /// Queues `op` at `priority` and returns its sequence number.
    pub fn add(&self, priority: i32, op: &NetworkOp, updates: &DbHandle) -> SyncResult<u64> {
        let sequence = self.allocate_sequence(updates)?;
        let position = QueuePosition { priority, sequence };
        updates.put(position.key(), to_message(op)?)?;
        debug!(priority, sequence, kind = %op.kind, "queued operation");
        Ok(sequence)
    }

    /// Removes the entry at (`priority`, `sequence`).
    ///
    /// With `expected`, the entry is only removed if it still holds that
    /// operation. A missing or replaced entry is silently left alone.
    pub fn remove(
        &self,
        priority: i32,
        sequence: u64,
        expected: Option<&NetworkOp>,
        updates: &DbHandle,
    ) -> SyncResult<()> {
        let position = QueuePosition { priority, sequence };
        let key = position.key();
        let Some(bytes) = updates.get(&key)? else {
            return Ok(());
        };
        let stored: Option<NetworkOp> = match from_message(&bytes) {
            Ok(op) => Some(op),
            Err(e) => {
                warn!(priority, sequence, error = %e, "undecodable queue entry");
                None
            }
        };
        if let Some(expected) = expected {
            if stored.as_ref() != Some(expected) {
                debug!(priority, sequence, "queue entry replaced; not removing");
                return Ok(());
            }
        }

        updates.delete(&key)?;
        if let Some(target) = stored.and_then(|op| op.target) {
            let index = index_key(&target);
            if self.indexed_position(&index, updates)? == Some(position) {
                updates.delete(&index)?;
            }
        }
        Ok(())
    }

    fn indexed_position(&self, index: &[u8], db: &DbHandle) -> SyncResult<Option<QueuePosition>> {
        let Some(bytes) = db.get(index)? else {
            return Ok(None);
        };
        match from_message(&bytes) {
            Ok(position) => Ok(Some(position)),
            Err(e) => {
                warn!(error = %e, "undecodable queue index entry");
                Ok(None)
            }
        }
    }

    /// Makes the queue hold `desired` for `target`: inserts, moves, replaces
    /// or (with `None`) removes its entry. Returns whether anything changed.
    ///
    /// Re-queueing at the same priority keeps the entry's place in its band.
    pub fn queue_entry(
        &self,
        target: &QueueTarget,
        desired: Option<(i32, NetworkOp)>,
        updates: &DbHandle,
    ) -> SyncResult<bool> {
        let index = index_key(target);
        let current = self.indexed_position(&index, updates)?;
        let existing = match current {
            Some(position) => updates
                .get(position.key())?
                .map(|bytes| (position, from_message::<NetworkOp>(&bytes).ok())),
            None => None,
        };

        match (existing, desired) {
            (None, None) => {
                if current.is_some() {
                    updates.delete(&index)?;
                }
                Ok(false)
            }
            (Some((position, _)), None) => {
                updates.delete(position.key())?;
                updates.delete(&index)?;
                debug!(%target, "dequeued");
                Ok(true)
            }
            (Some((position, stored)), Some((priority, op))) if position.priority == priority => {
                if stored.as_ref() == Some(&op) {
                    return Ok(false);
                }
                updates.put(position.key(), to_message(&op)?)?;
                Ok(true)
            }
            (existing, Some((priority, op))) => {
                if let Some((position, _)) = existing {
                    updates.delete(position.key())?;
                }
                let sequence = self.add(priority, &op, updates)?;
                updates.put(&index, to_message(&QueuePosition { priority, sequence })?)?;
                Ok(true)
            }
        }
    }

    /// Queues an upload for a photo that has not been uploaded yet, or
    /// dequeues it otherwise.
    pub fn queue_photo(&self, photo: &Photo, updates: &DbHandle) -> SyncResult<bool> {
        let target = QueueTarget::new(PHOTO_TABLE.name, photo.identity.local_id());
        let desired = (!photo.uploaded).then(|| {
            (
                PRIORITY_UPLOAD_PHOTO,
                NetworkOp::for_target(OpKind::UploadPhoto, target.clone()),
            )
        });
        self.queue_entry(&target, desired, updates)
    }

    /// Removes any queued upload of a photo.
    pub fn dequeue_photo(&self, local_id: i64, updates: &DbHandle) -> SyncResult<bool> {
        self.queue_entry(&QueueTarget::new(PHOTO_TABLE.name, local_id), None, updates)
    }

    /// Queues an update for an edited viewpoint. Removed viewpoints are
    /// dequeued.
    pub fn queue_viewpoint(&self, viewpoint: &Viewpoint, updates: &DbHandle) -> SyncResult<bool> {
        let target = QueueTarget::new(VIEWPOINT_TABLE.name, viewpoint.identity.local_id());
        let desired = (!viewpoint.removed).then(|| {
            (
                PRIORITY_UPDATE_VIEWPOINT,
                NetworkOp::for_target(OpKind::UpdateViewpoint, target.clone()),
            )
        });
        self.queue_entry(&target, desired, updates)
    }

    /// Queues an upload for an activity that has not been uploaded yet, or
    /// dequeues it otherwise.
    pub fn queue_activity(&self, activity: &Activity, updates: &DbHandle) -> SyncResult<bool> {
        let target = QueueTarget::new(ACTIVITY_TABLE.name, activity.identity.local_id());
        let desired = (!activity.uploaded).then(|| {
            (
                PRIORITY_UPLOAD_ACTIVITY,
                NetworkOp::for_target(OpKind::UploadActivity, target.clone()),
            )
        });
        self.queue_entry(&target, desired, updates)
    }

    /// Removes any queued upload of an activity.
    pub fn dequeue_activity(&self, local_id: i64, updates: &DbHandle) -> SyncResult<bool> {
        self.queue_entry(&QueueTarget::new(ACTIVITY_TABLE.name, local_id), None, updates)
    }

    // Staging

    /// Materializes the first queued operation of `kind` into its slot.
    ///
    /// Returns the already staged operation if the slot is occupied, so at
    /// most one operation per kind is in flight.
    pub fn stage(&self, kind: OpKind, db: &DbHandle) -> SyncResult<Option<QueueEntry>> {
        if let Some(entry) = self.staged.lock().get(&kind) {
            return Ok(Some(entry.clone()));
        }

        let mut iter = QueueIterator::new(db)?;
        let found = loop {
            match iter.entry() {
                None => break None,
                Some(entry) if entry.op.kind == kind => break Some(entry.clone()),
                Some(_) => iter.next()?,
            }
        };
        let Some(entry) = found else {
            return Ok(None);
        };

        let mut staged = self.staged.lock();
        let entry = staged.entry(kind).or_insert(entry).clone();
        debug!(%kind, priority = entry.priority(), sequence = entry.sequence(), "staged operation");
        Ok(Some(entry))
    }

    /// The staged operation of `kind`, if any.
    pub fn current(&self, kind: OpKind) -> Option<QueueEntry> {
        self.staged.lock().get(&kind).cloned()
    }

    /// Finishes the staged operation of `kind`.
    ///
    /// On success its entry is removed, unless it was replaced meanwhile. On
    /// failure the entry stays queued for a later retry. Either way the slot
    /// is cleared. Returns the operation that was staged.
    pub fn commit(
        &self,
        kind: OpKind,
        success: bool,
        updates: &DbHandle,
    ) -> SyncResult<Option<QueueEntry>> {
        let Some(entry) = self.staged.lock().remove(&kind) else {
            return Ok(None);
        };
        if success {
            self.remove(entry.priority(), entry.sequence(), Some(&entry.op), updates)?;
        }
        Ok(Some(entry))
    }

    /// Drops every staged operation without touching the queue.
    pub fn clear_staged(&self) {
        self.staged.lock().clear();
    }

    // Inspection

    /// Number of queued entries.
    pub fn len(&self, db: &DbHandle) -> SyncResult<usize> {
        Ok(db.count_prefix(QUEUE_PREFIX)?)
    }

    /// True if nothing is queued.
    pub fn is_empty(&self, db: &DbHandle) -> SyncResult<bool> {
        Ok(self.len(db)? == 0)
    }

    /// Every decodable entry in service order.
    pub fn entries(&self, db: &DbHandle) -> SyncResult<Vec<QueueEntry>> {
        QueueIterator::new(db)?.collect_entries()
    }
}

/// Walks queue entries in service order, skipping undecodable ones.
pub struct QueueIterator {
    iter: DbIterator,
    current: Option<QueueEntry>,
}

impl QueueIterator {
    /// Positions on the first entry.
    pub fn new(db: &DbHandle) -> SyncResult<Self> {
        let mut iter = db.iter();
        iter.seek(QUEUE_PREFIX)?;
        let mut this = Self { iter, current: None };
        this.settle()?;
        Ok(this)
    }

    fn settle(&mut self) -> SyncResult<()> {
        self.current = None;
        while self.iter.valid() && self.iter.key().starts_with(QUEUE_PREFIX.as_bytes()) {
            match QueueEntry::decode(self.iter.key(), self.iter.value()) {
                Ok(entry) => {
                    self.current = Some(entry);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "skipping undecodable queue entry");
                    self.iter.next()?;
                }
            }
        }
        Ok(())
    }

    /// True past the last entry.
    pub fn done(&self) -> bool {
        self.current.is_none()
    }

    /// The entry at the cursor.
    pub fn entry(&self) -> Option<&QueueEntry> {
        self.current.as_ref()
    }

    /// Moves to the next entry.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> SyncResult<()> {
        if self.current.is_some() {
            self.iter.next()?;
            self.settle()?;
        }
        Ok(())
    }

    /// Moves to the first entry of the next lower-urgency priority band.
    pub fn skip_priority_band(&mut self) -> SyncResult<()> {
        let Some(entry) = &self.current else {
            return Ok(());
        };
        match entry.priority().checked_add(1) {
            Some(priority) => {
                self.iter
                    .seek(KeyBuilder::with_prefix(QUEUE_PREFIX).i32(priority).build())?;
                self.settle()
            }
            None => {
                self.current = None;
                Ok(())
            }
        }
    }

    /// Consumes the iterator, collecting the remaining entries.
    pub fn collect_entries(mut self) -> SyncResult<Vec<QueueEntry>> {
        let mut out = Vec::new();
        while let Some(entry) = self.current.take() {
            out.push(entry);
            self.iter.next()?;
            self.settle()?;
        }
        Ok(out)
    }
}
