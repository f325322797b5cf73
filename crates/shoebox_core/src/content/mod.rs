//! Entity tables with a shared in-memory object cache.
//!
//! A [`ContentTable`] maps local ids, and optionally server ids, to
//! serialized entities. Loading the same id twice through non-snapshot
//! handles yields the same in-memory object while any [`ContentHandle`] to it
//! is alive. Mutation goes through an exclusive [`ContentGuard`].
//!
//! Key layout for a table with primary prefix `p/` and server prefix `ps/`:
//!
//! ```text
//! p/<local id>          → CBOR entity
//! ps/<server id>        → local id
//! <index prefix>...<id> → local id
//! ```

mod fsck;
mod identity;
pub mod iterator;
mod table;

pub use fsck::FsckReport;
pub use identity::Identity;
pub use iterator::{ContentIterator, IteratorPolicy, Placement, PrefixPolicy, RangePolicy};
pub use table::{ContentGuard, ContentHandle, ContentTable};

use crate::error::CoreResult;
use crate::kv::DbHandle;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shoebox_codec::{CodecError, CodecResult, KeyBuilder, KeyReader};

/// Size of an encoded local id at the end of primary and index keys.
pub const LOCAL_ID_LEN: usize = 8;

/// A persisted entity type.
pub trait Content: Serialize + DeserializeOwned + Send + 'static {
    /// Creates a blank entity for a freshly allocated id.
    fn with_local_id(local_id: i64) -> Self;

    /// Returns the entity identity.
    fn identity(&self) -> &Identity;

    /// Returns the entity identity for server id assignment.
    fn identity_mut(&mut self) -> &mut Identity;

    /// Secondary index keys this entity should appear under.
    ///
    /// Each key must start with one of the table's index prefixes and end
    /// with the encoded local id.
    fn index_keys(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Runs after reindexing and before the record is written. May still
    /// change the entity.
    fn save_hook(&mut self, _updates: &DbHandle) -> CoreResult<()> {
        Ok(())
    }

    /// Runs before the primary record is removed.
    fn delete_hook(&self, _updates: &DbHandle) -> CoreResult<()> {
        Ok(())
    }
}

/// Static layout of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name, used in metadata keys and logs.
    pub name: &'static str,
    /// Prefix of primary records.
    pub primary_prefix: &'static str,
    /// Prefix of the server id index.
    pub server_prefix: &'static str,
    /// Prefixes of the secondary indexes.
    pub index_prefixes: &'static [&'static str],
    /// Repair version the table expects. Bump to force a repair on next
    /// start.
    pub fsck_version: u32,
}

impl TableSpec {
    /// Primary key for `local_id`.
    #[must_use]
    pub fn primary_key(&self, local_id: i64) -> Vec<u8> {
        KeyBuilder::with_prefix(self.primary_prefix).i64(local_id).build()
    }

    /// Server index key for `server_id`.
    #[must_use]
    pub fn server_key(&self, server_id: &str) -> Vec<u8> {
        KeyBuilder::with_prefix(self.server_prefix)
            .tail_str(server_id)
            .build()
    }

    /// Decodes the local id from a primary key.
    pub fn decode_primary_key(&self, key: &[u8]) -> CodecResult<i64> {
        let mut reader = KeyReader::new(key);
        reader.expect_prefix(self.primary_prefix)?;
        let id = reader.i64()?;
        if !reader.is_empty() {
            return Err(CodecError::UnexpectedLength {
                expected: self.primary_prefix.len() + LOCAL_ID_LEN,
                actual: key.len(),
            });
        }
        Ok(id)
    }
}

/// Decodes the local id from the last bytes of an index key.
pub fn index_local_id(key: &[u8]) -> CodecResult<i64> {
    let start = key
        .len()
        .checked_sub(LOCAL_ID_LEN)
        .ok_or(CodecError::UnexpectedEof)?;
    KeyReader::new(&key[start..]).i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: TableSpec = TableSpec {
        name: "things",
        primary_prefix: "t/",
        server_prefix: "ts/",
        index_prefixes: &["tx/"],
        fsck_version: 1,
    };

    #[test]
    fn primary_keys_sort_by_id() {
        let a = SPEC.primary_key(2);
        let b = SPEC.primary_key(10);
        assert!(a < b);
        assert_eq!(SPEC.decode_primary_key(&b).unwrap(), 10);
    }

    #[test]
    fn foreign_key_is_rejected() {
        assert!(SPEC.decode_primary_key(b"ts/abc").is_err());
        let mut long = SPEC.primary_key(1);
        long.push(0);
        assert!(SPEC.decode_primary_key(&long).is_err());
    }

    #[test]
    fn index_tail_decodes() {
        let key = KeyBuilder::with_prefix("tx/").f64(1.5).i64(-4).build();
        assert_eq!(index_local_id(&key).unwrap(), -4);
        assert!(index_local_id(b"short").is_err());
    }
}
