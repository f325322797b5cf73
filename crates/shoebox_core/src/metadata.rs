//! Persisted metadata under the `m/` key prefix.
//!
//! Every key has a documented default so a missing entry is never an error:
//!
//! | Key | Default |
//! |-----|---------|
//! | `m/format_version` | absent (fresh store) |
//! | `m/fsck/<table>` | 0 |
//! | `m/next_id/<table>` | 1 |
//! | `m/network_queue_seq` | 1 |

use crate::error::CoreResult;
use crate::kv::DbHandle;

/// Prefix shared by all metadata keys.
pub const METADATA_PREFIX: &str = "m/";

/// Persisted store format version.
pub const FORMAT_VERSION_KEY: &str = "m/format_version";

/// Next sequence number handed out by the network queue.
pub const NETWORK_QUEUE_SEQ_KEY: &str = "m/network_queue_seq";

/// Format version written by this build.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// Repair watermark key for `table`.
#[must_use]
pub fn fsck_key(table: &str) -> String {
    format!("m/fsck/{table}")
}

/// Local id counter key for `table`.
#[must_use]
pub fn next_id_key(table: &str) -> String {
    format!("m/next_id/{table}")
}

/// Reads the stored format version, `None` for a fresh store.
pub fn format_version(db: &DbHandle) -> CoreResult<Option<u32>> {
    db.get_value(FORMAT_VERSION_KEY)
}

/// Reads the repair watermark of `table`.
pub fn fsck_version(db: &DbHandle, table: &str) -> CoreResult<u32> {
    Ok(db.get_value(fsck_key(table))?.unwrap_or(0))
}

/// Records that `table` has been repaired up to `version`.
pub fn set_fsck_version(updates: &DbHandle, table: &str, version: u32) -> CoreResult<()> {
    updates.put_value(fsck_key(table), &version)
}

/// Reads the next local id of `table`.
pub fn next_id(db: &DbHandle, table: &str) -> CoreResult<i64> {
    Ok(db.get_value(next_id_key(table))?.unwrap_or(1))
}

/// Stores the next local id of `table`.
pub fn set_next_id(updates: &DbHandle, table: &str, next: i64) -> CoreResult<()> {
    updates.put_value(next_id_key(table), &next)
}

/// Reads the next network queue sequence.
pub fn network_queue_seq(db: &DbHandle) -> CoreResult<u64> {
    Ok(db.get_value(NETWORK_QUEUE_SEQ_KEY)?.unwrap_or(1))
}

/// Stores the next network queue sequence.
pub fn set_network_queue_seq(updates: &DbHandle, next: u64) -> CoreResult<()> {
    updates.put_value(NETWORK_QUEUE_SEQ_KEY, &next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn missing_keys_read_as_defaults() {
        let db = Database::open_in_memory().unwrap();
        let handle = db.handle();
        assert_eq!(fsck_version(&handle, "photos").unwrap(), 0);
        assert_eq!(next_id(&handle, "photos").unwrap(), 1);
        assert_eq!(network_queue_seq(&handle).unwrap(), 1);
    }

    #[test]
    fn values_persist_through_transaction() {
        let db = Database::open_in_memory().unwrap();
        let txn = db.new_transaction().unwrap();
        set_next_id(&txn, "photos", 42).unwrap();
        set_network_queue_seq(&txn, 7).unwrap();
        set_fsck_version(&txn, "photos", 3).unwrap();
        txn.commit().unwrap();

        let handle = db.handle();
        assert_eq!(next_id(&handle, "photos").unwrap(), 42);
        assert_eq!(next_id(&handle, "comments").unwrap(), 1);
        assert_eq!(network_queue_seq(&handle).unwrap(), 7);
        assert_eq!(fsck_version(&handle, "photos").unwrap(), 3);
    }

    #[test]
    fn open_records_format_version() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(format_version(&db.handle()).unwrap(), Some(CURRENT_FORMAT_VERSION));
    }
}
