//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small alphabet so that generated operations
//! collide often enough to exercise overwrites and deletes.

use proptest::prelude::*;
use shoebox_core::{CoreResult, DbHandle, KeyValue};
use std::collections::BTreeMap;

/// Strategy for short keys over a four-letter alphabet.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'c', 0xff]), 1..4)
}

/// Strategy for values (arbitrary bytes, possibly empty).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..16)
}

/// A single key-value mutation.
#[derive(Debug, Clone)]
pub enum KvOp {
    /// Put a value.
    Put {
        /// Key.
        key: Vec<u8>,
        /// Value.
        value: Vec<u8>,
    },
    /// Delete a key.
    Delete {
        /// Key.
        key: Vec<u8>,
    },
}

impl KvOp {
    /// Applies the operation through `handle`.
    pub fn apply(&self, handle: &DbHandle) -> CoreResult<()> {
        match self {
            KvOp::Put { key, value } => handle.put(key, value),
            KvOp::Delete { key } => handle.delete(key),
        }
    }
}

/// Strategy for one operation, puts three times as likely as deletes.
pub fn kv_op_strategy() -> impl Strategy<Value = KvOp> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(key, value)| KvOp::Put { key, value }),
        1 => key_strategy().prop_map(|key| KvOp::Delete { key }),
    ]
}

/// Strategy for a sequence of operations.
pub fn kv_ops_strategy(min_ops: usize, max_ops: usize) -> impl Strategy<Value = Vec<KvOp>> {
    prop::collection::vec(kv_op_strategy(), min_ops..max_ops)
}

/// Reference model of an ordered key-value store.
#[derive(Debug, Clone, Default)]
pub struct KvModel {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl KvModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an operation.
    pub fn apply(&mut self, op: &KvOp) {
        match op {
            KvOp::Put { key, value } => {
                self.map.insert(key.clone(), value.clone());
            }
            KvOp::Delete { key } => {
                self.map.remove(key);
            }
        }
    }

    /// Returns the value of `key`.
    pub fn get(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.map.get(key)
    }

    /// All entries starting with `prefix`, ascending.
    pub fn entries_with_prefix(&self, prefix: &[u8]) -> Vec<KeyValue> {
        self.map
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// All entries, ascending.
    pub fn entries(&self) -> Vec<KeyValue> {
        self.entries_with_prefix(&[])
    }
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
