//! Filtered cursors over index ranges.

use crate::error::CoreResult;
use crate::kv::{DbHandle, DbIterator};
use shoebox_codec::{prefix_successor, CodecResult};

/// Where a key lies relative to an iterated range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Sorts before every key of the range.
    Before,
    /// Inside the range.
    Inside,
    /// Sorts after every key of the range.
    After,
}

/// Decides where a [`ContentIterator`] stops and which positions it yields.
///
/// A cursor steps over keys on the side of the range it is moving towards
/// and is done once it crosses the far side.
pub trait IteratorPolicy {
    /// Places `key` relative to the iterated range.
    fn locate(&self, key: &[u8]) -> Placement;

    /// True if the entry at `key` should be yielded. Rejected positions are
    /// skipped.
    fn is_valid(&self, _key: &[u8], _value: &[u8]) -> bool {
        true
    }
}

/// Iterates the keys that start with a prefix.
#[derive(Debug, Clone)]
pub struct PrefixPolicy {
    prefix: Vec<u8>,
}

impl PrefixPolicy {
    /// Creates a policy for `prefix`.
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the prefix.
    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }
}

impl IteratorPolicy for PrefixPolicy {
    fn locate(&self, key: &[u8]) -> Placement {
        if key.starts_with(&self.prefix) {
            Placement::Inside
        } else if key < self.prefix.as_slice() {
            Placement::Before
        } else {
            Placement::After
        }
    }
}

/// Iterates the keys in `[start, end)`.
#[derive(Debug, Clone)]
pub struct RangePolicy {
    start: Vec<u8>,
    end: Vec<u8>,
}

impl RangePolicy {
    /// Creates a policy for `[start, end)`.
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl IteratorPolicy for RangePolicy {
    fn locate(&self, key: &[u8]) -> Placement {
        if key < self.start.as_slice() {
            Placement::Before
        } else if key >= self.end.as_slice() {
            Placement::After
        } else {
            Placement::Inside
        }
    }
}

/// A cursor that walks a key range under an [`IteratorPolicy`].
///
/// Once the cursor leaves the range it is done for good; seeking again does
/// not revive it.
pub struct ContentIterator<P: IteratorPolicy> {
    iter: DbIterator,
    policy: P,
    reverse: bool,
    done: bool,
}

impl<P: IteratorPolicy> ContentIterator<P> {
    /// Creates an unpositioned cursor over `db`. Call [`seek`](Self::seek)
    /// before reading.
    pub fn new(db: &DbHandle, policy: P, reverse: bool) -> Self {
        Self {
            iter: db.iter(),
            policy,
            reverse,
            done: false,
        }
    }

    /// Positions at the first valid entry at or after `target`, or for a
    /// reverse cursor at or before it. A reverse seek past the end of the
    /// range steps back to its last key.
    pub fn seek(&mut self, target: impl AsRef<[u8]>) -> CoreResult<()> {
        if self.done {
            return Ok(());
        }
        if self.reverse {
            self.iter.seek_for_prev(target)?;
        } else {
            self.iter.seek(target)?;
        }
        self.settle()
    }

    /// Moves one position forward in key order, skipping rejected entries.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> CoreResult<()> {
        if self.done {
            return Ok(());
        }
        self.iter.next()?;
        self.settle_forward(true)
    }

    /// Moves one position backward in key order, skipping rejected entries.
    pub fn prev(&mut self) -> CoreResult<()> {
        if self.done {
            return Ok(());
        }
        self.iter.prev()?;
        self.settle_forward(false)
    }

    /// Moves one position in the cursor's own direction.
    pub fn advance(&mut self) -> CoreResult<()> {
        if self.reverse {
            self.prev()
        } else {
            self.next()
        }
    }

    fn settle(&mut self) -> CoreResult<()> {
        self.settle_forward(!self.reverse)
    }

    fn settle_forward(&mut self, forward: bool) -> CoreResult<()> {
        let (behind, beyond) = if forward {
            (Placement::Before, Placement::After)
        } else {
            (Placement::After, Placement::Before)
        };
        loop {
            if !self.iter.valid() {
                self.done = true;
                return Ok(());
            }
            let placement = self.policy.locate(self.iter.key());
            if placement == beyond {
                self.done = true;
                return Ok(());
            }
            if placement != behind && self.policy.is_valid(self.iter.key(), self.iter.value()) {
                return Ok(());
            }
            if forward {
                self.iter.next()?;
            } else {
                self.iter.prev()?;
            }
        }
    }

    /// True once the cursor has left its range.
    #[must_use]
    pub fn done(&self) -> bool {
        self.done
    }

    /// Key at the cursor; empty when done.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        if self.done {
            &[]
        } else {
            self.iter.key()
        }
    }

    /// Value at the cursor; empty when done.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        if self.done {
            &[]
        } else {
            self.iter.value()
        }
    }

    /// Local id encoded at the end of the current index key.
    pub fn local_id(&self) -> CodecResult<i64> {
        super::index_local_id(self.key())
    }

    /// Returns the policy.
    pub fn policy(&self) -> &P {
        &self.policy
    }
}

impl ContentIterator<PrefixPolicy> {
    /// Cursor over every key with `prefix`, positioned on the first (or for
    /// `reverse`, the last) entry.
    pub fn over_prefix(db: &DbHandle, prefix: impl Into<Vec<u8>>, reverse: bool) -> CoreResult<Self> {
        let policy = PrefixPolicy::new(prefix);
        let start = policy.prefix().to_vec();
        let mut iter = Self::new(db, policy, reverse);
        if !reverse {
            iter.seek(start)?;
            return Ok(iter);
        }
        match prefix_successor(&start) {
            Some(upper) => iter.iter.seek_for_prev(upper)?,
            None => iter.iter.seek_to_last()?,
        }
        iter.settle()?;
        Ok(iter)
    }

    /// Collects the local ids of every remaining entry.
    pub fn collect_ids(mut self) -> CoreResult<Vec<i64>> {
        let mut ids = Vec::new();
        while !self.done() {
            ids.push(self.local_id()?);
            self.advance()?;
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    struct EvenValues(PrefixPolicy);

    impl IteratorPolicy for EvenValues {
        fn locate(&self, key: &[u8]) -> Placement {
            self.0.locate(key)
        }

        fn is_valid(&self, _key: &[u8], value: &[u8]) -> bool {
            value.first().map_or(false, |v| v % 2 == 0)
        }
    }

    fn populated() -> Database {
        let db = Database::open_in_memory().unwrap();
        let h = db.handle();
        for (i, key) in ["a/1", "a/2", "a/3", "a/4", "b/1"].iter().enumerate() {
            h.put(key, [i as u8]).unwrap();
        }
        h.put("0", [0]).unwrap();
        db
    }

    fn drain<P: IteratorPolicy>(mut iter: ContentIterator<P>) -> Vec<String> {
        let mut out = Vec::new();
        while !iter.done() {
            out.push(String::from_utf8(iter.key().to_vec()).unwrap());
            iter.advance().unwrap();
        }
        out
    }

    #[test]
    fn prefix_forward_and_reverse() {
        let db = populated();
        let forward = ContentIterator::over_prefix(&db.handle(), "a/", false).unwrap();
        assert_eq!(drain(forward), ["a/1", "a/2", "a/3", "a/4"]);
        let reverse = ContentIterator::over_prefix(&db.handle(), "a/", true).unwrap();
        assert_eq!(drain(reverse), ["a/4", "a/3", "a/2", "a/1"]);
    }

    #[test]
    fn rejected_positions_are_skipped() {
        let db = populated();
        let mut iter = ContentIterator::new(&db.handle(), EvenValues(PrefixPolicy::new("a/")), false);
        iter.seek("a/").unwrap();
        // Values are 0..=3 for a/1..a/4.
        assert_eq!(drain(iter), ["a/1", "a/3"]);
    }

    #[test]
    fn range_policy_is_half_open() {
        let db = populated();
        let mut iter = ContentIterator::new(&db.handle(), RangePolicy::new("a/2", "a/4"), false);
        iter.seek("a/2").unwrap();
        assert_eq!(drain(iter), ["a/2", "a/3"]);
    }

    #[test]
    fn reverse_seek_past_end_clamps_to_last_key() {
        let db = populated();
        db.handle().put("y", [9]).unwrap();
        let mut iter = ContentIterator::new(&db.handle(), RangePolicy::new("a/", "zzz"), true);
        iter.seek("zz").unwrap();
        assert_eq!(iter.key(), b"y");
    }

    #[test]
    fn reverse_seek_steps_back_over_keys_past_the_range() {
        let db = populated();
        // "b/1" and the format version key sort between the range end and
        // the target.
        let mut iter = ContentIterator::new(&db.handle(), RangePolicy::new("a/", "b/"), true);
        iter.seek("z").unwrap();
        assert!(!iter.done());
        assert_eq!(drain(iter), ["a/4", "a/3", "a/2", "a/1"]);
    }

    #[test]
    fn forward_seek_before_the_range_steps_into_it() {
        let db = populated();
        let mut iter = ContentIterator::new(&db.handle(), RangePolicy::new("a/3", "b/"), false);
        iter.seek("0").unwrap();
        assert_eq!(drain(iter), ["a/3", "a/4"]);
    }

    #[test]
    fn done_is_sticky() {
        let db = populated();
        let mut iter = ContentIterator::new(&db.handle(), PrefixPolicy::new("b/"), false);
        iter.seek("b/").unwrap();
        iter.next().unwrap();
        assert!(iter.done());
        iter.seek("b/").unwrap();
        assert!(iter.done());
        assert!(iter.key().is_empty());
    }
}
