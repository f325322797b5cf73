//! Bidirectional cursor over a handle's view.

use crate::error::CoreResult;
use crate::kv::handle::DbHandle;
use crate::kv::store::{Direction, KeyValue};
use std::ops::Bound;

/// A cursor over the keys visible through a [`DbHandle`].
///
/// On a transaction handle the cursor merges pending writes over the
/// committed keys: a pending put shadows the committed value and a pending
/// delete hides the key. Each step re-reads the view, so writes made through
/// the same transaction after positioning are observed by later steps.
///
/// A fresh cursor is not positioned; call one of the seek methods first.
///
/// The cursor walks the whole keyspace, including the reserved
/// [`METADATA_PREFIX`](crate::metadata::METADATA_PREFIX) keys every store
/// carries. Bound user scans with a prefix to leave them out.
pub struct DbIterator {
    handle: DbHandle,
    current: Option<KeyValue>,
}

impl DbIterator {
    pub(crate) fn new(handle: DbHandle) -> Self {
        Self {
            handle,
            current: None,
        }
    }

    /// Returns true if the cursor is on an entry.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// Key at the cursor; empty when not valid.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        self.current.as_ref().map_or(&[], |(k, _)| k.as_slice())
    }

    /// Value at the cursor; empty when not valid.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        self.current.as_ref().map_or(&[], |(_, v)| v.as_slice())
    }

    /// Positions on the first key at or after `target`.
    pub fn seek(&mut self, target: impl AsRef<[u8]>) -> CoreResult<()> {
        self.current = self
            .handle
            .step(Bound::Included(target.as_ref()), Direction::Forward)?;
        Ok(())
    }

    /// Positions on the last key at or before `target`.
    pub fn seek_for_prev(&mut self, target: impl AsRef<[u8]>) -> CoreResult<()> {
        self.current = self
            .handle
            .step(Bound::Included(target.as_ref()), Direction::Reverse)?;
        Ok(())
    }

    /// Positions on the first key.
    pub fn seek_to_first(&mut self) -> CoreResult<()> {
        self.current = self.handle.step(Bound::Unbounded, Direction::Forward)?;
        Ok(())
    }

    /// Positions on the last key.
    pub fn seek_to_last(&mut self) -> CoreResult<()> {
        self.current = self.handle.step(Bound::Unbounded, Direction::Reverse)?;
        Ok(())
    }

    /// Moves to the next key. Does nothing when not valid.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> CoreResult<()> {
        self.advance(Direction::Forward)
    }

    /// Moves to the previous key. Does nothing when not valid.
    pub fn prev(&mut self) -> CoreResult<()> {
        self.advance(Direction::Reverse)
    }

    fn advance(&mut self, dir: Direction) -> CoreResult<()> {
        if let Some((key, _)) = self.current.take() {
            self.current = self.handle.step(Bound::Excluded(key.as_slice()), dir)?;
        }
        Ok(())
    }

    /// Consumes the cursor, collecting entries from the current position
    /// forward.
    pub fn collect_forward(mut self) -> CoreResult<Vec<KeyValue>> {
        let mut out = Vec::new();
        while let Some(entry) = self.current.clone() {
            out.push(entry);
            self.next()?;
        }
        Ok(out)
    }

    /// Consumes the cursor, collecting entries from the current position
    /// backward.
    pub fn collect_reverse(mut self) -> CoreResult<Vec<KeyValue>> {
        let mut out = Vec::new();
        while let Some(entry) = self.current.clone() {
            out.push(entry);
            self.prev()?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::metadata::{FORMAT_VERSION_KEY, METADATA_PREFIX};
    use crate::Database;

    /// User keys only; every store also holds its `m/` metadata.
    fn keys(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Vec<String> {
        entries
            .into_iter()
            .filter(|(k, _)| !k.starts_with(METADATA_PREFIX.as_bytes()))
            .map(|(k, _)| String::from_utf8(k).unwrap())
            .collect()
    }

    #[test]
    fn merged_iteration_in_both_directions() {
        let db = Database::open_in_memory().unwrap();
        let base = db.handle();
        for key in ["b", "d", "f"] {
            base.put(key, "base").unwrap();
        }

        let txn = db.new_transaction().unwrap();
        txn.put("a", "txn").unwrap();
        txn.delete("d").unwrap();
        txn.put("f", "txn").unwrap();
        txn.put("g", "txn").unwrap();
        txn.delete("z").unwrap();

        let mut iter = txn.iter();
        iter.seek_to_first().unwrap();
        assert_eq!(keys(iter.collect_forward().unwrap()), ["a", "b", "f", "g"]);

        let reverse = txn.reverse_iter().unwrap().collect_reverse().unwrap();
        assert_eq!(keys(reverse.clone()), ["g", "f", "b", "a"]);

        let f = reverse.iter().find(|(k, _)| k == b"f").unwrap();
        assert_eq!(f.1, b"txn");
    }

    #[test]
    fn seek_lands_on_next_visible_key() {
        let db = Database::open_in_memory().unwrap();
        let base = db.handle();
        for key in ["a", "c", "e"] {
            base.put(key, "v").unwrap();
        }
        let txn = db.new_transaction().unwrap();
        txn.delete("c").unwrap();

        let mut iter = txn.iter();
        iter.seek("b").unwrap();
        assert_eq!(iter.key(), b"e");

        iter.seek_for_prev("d").unwrap();
        assert_eq!(iter.key(), b"a");

        iter.prev().unwrap();
        assert!(!iter.valid());
        iter.next().unwrap();
        assert!(!iter.valid());
    }

    #[test]
    fn snapshot_iteration_ignores_later_writes() {
        let db = Database::open_in_memory().unwrap();
        let base = db.handle();
        base.put("a", "1").unwrap();
        let snap = db.new_snapshot();
        base.put("b", "2").unwrap();
        base.delete("a").unwrap();

        let mut iter = snap.iter();
        iter.seek_to_first().unwrap();
        assert_eq!(keys(iter.collect_forward().unwrap()), ["a"]);
    }

    #[test]
    fn full_scan_includes_metadata_keys() {
        let db = Database::open_in_memory().unwrap();
        db.handle().put("a", "1").unwrap();

        let mut iter = db.handle().iter();
        iter.seek_to_first().unwrap();
        let all: Vec<_> = iter
            .collect_forward()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(all, vec![b"a".to_vec(), FORMAT_VERSION_KEY.as_bytes().to_vec()]);
        assert_eq!(keys(db.handle().scan_prefix("a").unwrap()), ["a"]);
    }
}
