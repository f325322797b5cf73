//! Versioned in-memory map backed by the commit log.
//!
//! Each key holds a chain of versions tagged with the sequence number of the
//! batch that wrote them. Direct and transaction handles read the newest
//! version; snapshot handles read the newest version at or below their
//! captured sequence. Versions that no live snapshot can see are pruned when
//! their key is next written, so a commit costs time in the size of its batch
//! rather than the size of the store.

use crate::error::CoreResult;
use crate::kv::record::{BatchRecord, Decoded};
use crate::types::SequenceNumber;
use parking_lot::{Mutex, RwLock};
use shoebox_storage::LogBackend;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// A key and its value.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// A batch entry: key and new value, `None` for a delete.
pub(crate) type BatchEntry = (Vec<u8>, Option<Vec<u8>>);

/// Which version of a key a read observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadPoint {
    /// The newest committed version.
    Latest,
    /// The newest version committed at or before this sequence.
    At(u64),
}

/// Iteration direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Whether `a` is reached no later than `b` when moving in this direction.
    pub(crate) fn reaches_first(self, a: &[u8], b: &[u8]) -> bool {
        match self {
            Direction::Forward => a <= b,
            Direction::Reverse => a >= b,
        }
    }
}

#[derive(Debug, Clone)]
struct Version {
    seq: u64,
    value: Option<Vec<u8>>,
}

type VersionMap = BTreeMap<Vec<u8>, Vec<Version>>;

/// Counters describing the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Keys whose newest version is live.
    pub live_keys: usize,
    /// Versions held across all chains, tombstones included.
    pub versions: usize,
    /// Snapshot handles currently pinning versions.
    pub live_snapshots: usize,
    /// Sequence number of the last committed batch.
    pub committed_seq: SequenceNumber,
    /// Size of the commit log in bytes.
    pub log_size: u64,
}

pub(crate) struct Store {
    map: RwLock<VersionMap>,
    log: Mutex<Box<dyn LogBackend>>,
    committed_seq: AtomicU64,
    /// Pinned snapshot sequence → number of handles pinning it.
    snapshots: Mutex<BTreeMap<u64, usize>>,
    sync_on_commit: bool,
}

impl Store {
    /// Opens a store by replaying `backend`.
    ///
    /// Replay stops at the first record that fails to verify; the log is
    /// truncated there so the next commit appends after the last good batch.
    pub(crate) fn open(mut backend: Box<dyn LogBackend>, sync_on_commit: bool) -> CoreResult<Self> {
        let bytes = backend.read_all()?;
        let mut map = VersionMap::new();
        let mut offset = 0usize;
        let mut last_seq = 0u64;
        let mut batches = 0usize;

        while offset < bytes.len() {
            let torn = match BatchRecord::decode(&bytes[offset..]) {
                Decoded::Record(record, len) => {
                    let seq = record.sequence.as_u64();
                    if seq <= last_seq {
                        Some(format!("sequence {seq} does not follow {last_seq}"))
                    } else {
                        apply_batch(&mut map, record.entries, seq, None);
                        last_seq = seq;
                        offset += len;
                        batches += 1;
                        None
                    }
                }
                Decoded::Torn(reason) => Some(reason),
            };

            if let Some(reason) = torn {
                warn!(offset, %reason, "discarding torn commit log tail");
                backend.truncate(offset as u64)?;
                break;
            }
        }

        debug!(batches, last_seq, keys = map.len(), "replayed commit log");

        Ok(Self {
            map: RwLock::new(map),
            log: Mutex::new(backend),
            committed_seq: AtomicU64::new(last_seq),
            snapshots: Mutex::new(BTreeMap::new()),
            sync_on_commit,
        })
    }

    pub(crate) fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::SeqCst))
    }

    pub(crate) fn get(&self, key: &[u8], at: ReadPoint) -> Option<Vec<u8>> {
        let map = self.map.read();
        map.get(key).and_then(|chain| visible(chain, at)).cloned()
    }

    /// Returns the first live entry strictly beyond `from` in `dir`.
    pub(crate) fn neighbor(
        &self,
        from: Bound<&[u8]>,
        dir: Direction,
        at: ReadPoint,
    ) -> Option<KeyValue> {
        let map = self.map.read();
        let found = match dir {
            Direction::Forward => map
                .range::<[u8], _>((from, Bound::Unbounded))
                .find_map(|(k, chain)| visible(chain, at).map(|v| (k, v))),
            Direction::Reverse => map
                .range::<[u8], _>((Bound::Unbounded, from))
                .rev()
                .find_map(|(k, chain)| visible(chain, at).map(|v| (k, v))),
        };
        found.map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Durably appends `entries` as one batch, then publishes it.
    ///
    /// Nothing becomes visible unless the log append and flush succeed. On
    /// failure any partially appended bytes are cut off again.
    pub(crate) fn commit(&self, entries: Vec<BatchEntry>) -> CoreResult<SequenceNumber> {
        let mut log = self.log.lock();
        let seq = self.committed_seq.load(Ordering::SeqCst) + 1;
        let record = BatchRecord {
            sequence: SequenceNumber::new(seq),
            entries,
        };
        let bytes = record.encode()?;

        let start = log.size()?;
        let written = log.append(&bytes).and_then(|_| {
            if self.sync_on_commit {
                log.sync()
            } else {
                log.flush()
            }
        });
        if let Err(e) = written {
            warn!(seq, error = %e, "commit failed; batch discarded");
            if log.size().map_or(false, |size| size > start) {
                if let Err(trunc) = log.truncate(start) {
                    warn!(error = %trunc, "could not cut partial batch from log");
                }
            }
            return Err(e.into());
        }

        let mut map = self.map.write();
        let oldest = self.snapshots.lock().keys().next().copied();
        let count = record.entries.len();
        apply_batch(&mut map, record.entries, seq, oldest);
        self.committed_seq.store(seq, Ordering::SeqCst);
        debug!(seq, entries = count, "committed batch");
        Ok(SequenceNumber::new(seq))
    }

    /// Pins the current committed sequence for a snapshot.
    pub(crate) fn acquire_snapshot(&self) -> u64 {
        // Holding the map lock keeps a concurrent commit from pruning
        // between reading the sequence and pinning it.
        let _map = self.map.read();
        let seq = self.committed_seq.load(Ordering::SeqCst);
        *self.snapshots.lock().entry(seq).or_insert(0) += 1;
        seq
    }

    pub(crate) fn release_snapshot(&self, seq: u64) {
        let mut snapshots = self.snapshots.lock();
        if let Entry::Occupied(mut pinned) = snapshots.entry(seq) {
            *pinned.get_mut() -= 1;
            if *pinned.get() == 0 {
                pinned.remove();
            }
        }
    }

    /// Prunes every version chain. Returns the number of versions dropped.
    pub(crate) fn collect_garbage(&self) -> usize {
        let mut map = self.map.write();
        let oldest = self.snapshots.lock().keys().next().copied();
        let before: usize = map.values().map(Vec::len).sum();
        map.retain(|_, chain| {
            prune(chain, oldest);
            !all_tombstones(chain)
        });
        let after: usize = map.values().map(Vec::len).sum();
        before - after
    }

    pub(crate) fn stats(&self) -> CoreResult<StoreStats> {
        let log_size = self.log.lock().size()?;
        let map = self.map.read();
        Ok(StoreStats {
            live_keys: map
                .values()
                .filter(|chain| visible(chain, ReadPoint::Latest).is_some())
                .count(),
            versions: map.values().map(Vec::len).sum(),
            live_snapshots: self.snapshots.lock().values().sum(),
            committed_seq: self.committed_seq(),
            log_size,
        })
    }
}

fn visible(chain: &[Version], at: ReadPoint) -> Option<&Vec<u8>> {
    let version = match at {
        ReadPoint::Latest => chain.last(),
        ReadPoint::At(seq) => chain.iter().rev().find(|v| v.seq <= seq),
    };
    version.and_then(|v| v.value.as_ref())
}

/// Applies one batch. Only the chains it writes are pruned; a chain left
/// holding nothing but tombstones is removed, since every reader sees the
/// key as absent either way.
fn apply_batch(map: &mut VersionMap, entries: Vec<BatchEntry>, seq: u64, oldest: Option<u64>) {
    for (key, value) in entries {
        match map.entry(key) {
            Entry::Occupied(mut slot) => {
                let chain = slot.get_mut();
                match chain.last_mut() {
                    Some(last) if last.seq == seq => last.value = value,
                    _ => chain.push(Version { seq, value }),
                }
                prune(chain, oldest);
                if all_tombstones(chain) {
                    slot.remove();
                }
            }
            Entry::Vacant(slot) => {
                if value.is_some() {
                    slot.insert(vec![Version { seq, value }]);
                }
            }
        }
    }
}

fn all_tombstones(chain: &[Version]) -> bool {
    chain.iter().all(|v| v.value.is_none())
}

/// Drops versions hidden from every reader. The newest version is always
/// kept; with a pinned snapshot, so is the version that snapshot sees.
fn prune(chain: &mut Vec<Version>, oldest_snapshot: Option<u64>) {
    let keep_from = match oldest_snapshot {
        Some(seq) => chain
            .iter()
            .rposition(|v| v.seq <= seq)
            .unwrap_or(0),
        None => chain.len().saturating_sub(1),
    };
    if keep_from > 0 {
        chain.drain(..keep_from);
    }
}
