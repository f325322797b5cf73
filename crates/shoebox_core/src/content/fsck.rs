//! Versioned repair of derived index entries.

use super::{Content, ContentTable};
use crate::error::CoreResult;
use crate::kv::DbHandle;
use crate::metadata;
use serde::Serialize;
use shoebox_codec::{from_message, TypedValue};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Outcome of [`ContentTable::fsck`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FsckReport {
    /// Table name.
    pub table: String,
    /// False if the watermark was current and the pass was skipped.
    pub ran: bool,
    /// Primary records examined.
    pub records: usize,
    /// Primary records that could not be decoded or whose id did not match
    /// their key. They are left in place.
    pub corrupt: usize,
    /// Server index entries written or corrected.
    pub server_entries_repaired: usize,
    /// Secondary index entries written.
    pub index_entries_repaired: usize,
    /// Index entries removed because no entity produces them.
    pub dangling_removed: usize,
    /// Watermark after the pass.
    pub version: u32,
}

impl FsckReport {
    /// Total number of entries written or removed.
    #[must_use]
    pub fn repairs(&self) -> usize {
        self.server_entries_repaired + self.index_entries_repaired + self.dangling_removed
    }
}

impl<T: Content> ContentTable<T> {
    /// Repairs the table's derived index entries if its repair watermark is
    /// behind the table's version, or unconditionally when `force` is set.
    ///
    /// Rebuilds missing server index and secondary index entries and removes
    /// entries no stored entity produces. Primary records are never removed.
    /// Running it twice in a row makes no further changes.
    ///
    /// All reads and writes go through `updates`; the caller commits.
    pub fn fsck(
        &self,
        force: bool,
        progress: Option<&dyn Fn(&str)>,
        updates: &DbHandle,
    ) -> CoreResult<FsckReport> {
        let spec = self.spec();
        let report_progress = |message: &str| {
            if let Some(progress) = progress {
                progress(message);
            }
        };

        let watermark = metadata::fsck_version(updates, spec.name)?;
        let mut report = FsckReport {
            table: spec.name.to_string(),
            version: watermark,
            ..FsckReport::default()
        };
        if !force && watermark >= spec.fsck_version {
            debug!(table = spec.name, watermark, "fsck watermark current");
            return Ok(report);
        }
        report.ran = true;

        let records = updates.scan_prefix(spec.primary_prefix)?;
        report_progress(&format!("{}: checking {} records", spec.name, records.len()));

        let mut expected_server: HashMap<Vec<u8>, i64> = HashMap::new();
        let mut expected_index: HashSet<Vec<u8>> = HashSet::new();

        for (key, bytes) in &records {
            report.records += 1;
            let Ok(local_id) = spec.decode_primary_key(key) else {
                warn!(table = spec.name, "fsck: malformed primary key");
                report.corrupt += 1;
                continue;
            };
            let entity = match from_message::<T>(bytes) {
                Ok(entity) if entity.identity().local_id() == local_id => entity,
                Ok(_) | Err(_) => {
                    warn!(table = spec.name, local_id, "fsck: corrupt record left in place");
                    report.corrupt += 1;
                    continue;
                }
            };

            if let Some(server_id) = entity.identity().server_id() {
                let server_key = spec.server_key(server_id);
                let stored = updates
                    .get(&server_key)?
                    .and_then(|bytes| i64::decode_value(&bytes).ok());
                if stored != Some(local_id) {
                    updates.put_value(&server_key, &local_id)?;
                    report.server_entries_repaired += 1;
                }
                expected_server.insert(server_key, local_id);
            }

            for index_key in entity.index_keys() {
                if !updates.exists(&index_key)? {
                    updates.put_value(&index_key, &local_id)?;
                    report.index_entries_repaired += 1;
                }
                expected_index.insert(index_key);
            }
        }

        for (key, _) in updates.scan_prefix(spec.server_prefix)? {
            if !expected_server.contains_key(&key) {
                updates.delete(&key)?;
                report.dangling_removed += 1;
            }
        }
        for prefix in spec.index_prefixes {
            for (key, _) in updates.scan_prefix(prefix)? {
                if !expected_index.contains(&key) {
                    updates.delete(&key)?;
                    report.dangling_removed += 1;
                }
            }
        }

        report.version = watermark.max(spec.fsck_version);
        metadata::set_fsck_version(updates, spec.name, report.version)?;

        if report.repairs() > 0 {
            warn!(
                table = spec.name,
                server = report.server_entries_repaired,
                index = report.index_entries_repaired,
                dangling = report.dangling_removed,
                "fsck repaired index entries"
            );
        }
        report_progress(&format!("{}: {} repairs", spec.name, report.repairs()));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::content::{Content, ContentTable, Identity, TableSpec};
    use crate::Database;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use shoebox_codec::KeyBuilder;

    #[derive(Debug, Serialize, Deserialize)]
    struct Tag {
        identity: Identity,
        weight: i64,
    }

    impl Content for Tag {
        fn with_local_id(local_id: i64) -> Self {
            Self {
                identity: Identity::local(local_id),
                weight: 0,
            }
        }

        fn identity(&self) -> &Identity {
            &self.identity
        }

        fn identity_mut(&mut self) -> &mut Identity {
            &mut self.identity
        }

        fn index_keys(&self) -> Vec<Vec<u8>> {
            vec![weight_key(self.weight, self.identity.local_id())]
        }
    }

    fn weight_key(weight: i64, local_id: i64) -> Vec<u8> {
        KeyBuilder::with_prefix("gw/").i64(weight).i64(local_id).build()
    }

    fn tags(version: u32) -> ContentTable<Tag> {
        ContentTable::new(TableSpec {
            name: "tags",
            primary_prefix: "g/",
            server_prefix: "gs/",
            index_prefixes: &["gw/"],
            fsck_version: version,
        })
    }

    fn seed(db: &Database, table: &ContentTable<Tag>) -> i64 {
        let txn = db.new_transaction().unwrap();
        let mut tag = table.new_content(&txn).unwrap();
        tag.weight = 4;
        tag.identity_mut().assign_server_id("tag-1");
        let id = tag.local_id();
        tag.save_and_unlock(&txn).unwrap();
        txn.commit().unwrap();
        id
    }

    #[test]
    fn repairs_missing_and_dangling_entries() {
        let db = Database::open_in_memory().unwrap();
        let table = tags(1);
        let id = seed(&db, &table);

        let direct = db.handle();
        direct.delete(weight_key(4, id)).unwrap();
        direct.delete(table.spec().server_key("tag-1")).unwrap();
        direct.put_value(weight_key(99, 12345), &12345i64).unwrap();
        direct.put_value(table.spec().server_key("ghost"), &777i64).unwrap();

        let messages = Mutex::new(Vec::new());
        let progress = |m: &str| messages.lock().push(m.to_string());
        let txn = db.new_transaction().unwrap();
        let report = table.fsck(false, Some(&progress), &txn).unwrap();
        txn.commit().unwrap();

        assert!(report.ran);
        assert_eq!(report.records, 1);
        assert_eq!(report.server_entries_repaired, 1);
        assert_eq!(report.index_entries_repaired, 1);
        assert_eq!(report.dangling_removed, 2);
        assert_eq!(report.version, 1);
        assert!(!messages.lock().is_empty());

        assert!(direct.exists(weight_key(4, id)).unwrap());
        assert!(!direct.exists(weight_key(99, 12345)).unwrap());
        assert!(table.load_by_server_id("tag-1", &direct).unwrap().is_some());
    }

    #[test]
    fn second_pass_changes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let table = tags(1);
        seed(&db, &table);
        db.handle().put_value(weight_key(1, 50), &50i64).unwrap();

        let first = table.fsck(true, None, &db.handle()).unwrap();
        assert_eq!(first.repairs(), 1);
        let second = table.fsck(true, None, &db.handle()).unwrap();
        assert!(second.ran);
        assert_eq!(second.repairs(), 0);
    }

    #[test]
    fn watermark_gates_unforced_runs() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, &tags(1));

        assert!(tags(1).fsck(false, None, &db.handle()).unwrap().ran);
        assert!(!tags(1).fsck(false, None, &db.handle()).unwrap().ran);
        assert!(tags(2).fsck(false, None, &db.handle()).unwrap().ran);
        assert!(tags(1).fsck(true, None, &db.handle()).unwrap().ran);
    }

    #[test]
    fn corrupt_records_survive() {
        let db = Database::open_in_memory().unwrap();
        let table = tags(1);
        let key = table.spec().primary_key(9);
        db.handle().put(&key, b"not cbor \xff").unwrap();

        let report = table.fsck(true, None, &db.handle()).unwrap();
        assert_eq!(report.corrupt, 1);
        assert!(db.handle().exists(&key).unwrap());
    }
}
