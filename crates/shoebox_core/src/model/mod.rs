//! Domain entities and their tables.

mod activity;
mod comment;
mod photo;
mod viewpoint;

pub use activity::{activities_by_viewpoint, Activity, ActivityKind, ACTIVITY_TABLE, ACTIVITY_VIEWPOINT_PREFIX};
pub use comment::{comments_by_viewpoint, Comment, COMMENT_TABLE, COMMENT_VIEWPOINT_PREFIX};
pub use photo::{photos_by_timestamp, Photo, PHOTO_TABLE, PHOTO_TIMESTAMP_PREFIX};
pub use viewpoint::{viewpoints_by_update_time, Viewpoint, VIEWPOINT_TABLE, VIEWPOINT_UPDATE_PREFIX};

use crate::content::{ContentTable, FsckReport, TableSpec};
use crate::error::CoreResult;
use crate::kv::DbHandle;

/// Layouts of every domain table.
pub const ALL_TABLES: [&TableSpec; 4] = [&PHOTO_TABLE, &VIEWPOINT_TABLE, &ACTIVITY_TABLE, &COMMENT_TABLE];

/// The domain tables of one session.
#[derive(Debug, Clone)]
pub struct Tables {
    /// Photos.
    pub photos: ContentTable<Photo>,
    /// Viewpoints.
    pub viewpoints: ContentTable<Viewpoint>,
    /// Activities.
    pub activities: ContentTable<Activity>,
    /// Comments.
    pub comments: ContentTable<Comment>,
}

impl Tables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            photos: ContentTable::new(PHOTO_TABLE),
            viewpoints: ContentTable::new(VIEWPOINT_TABLE),
            activities: ContentTable::new(ACTIVITY_TABLE),
            comments: ContentTable::new(COMMENT_TABLE),
        }
    }

    /// Runs FSCK over every table. Writes go to `updates`.
    pub fn fsck(
        &self,
        force: bool,
        progress: Option<&dyn Fn(&str)>,
        updates: &DbHandle,
    ) -> CoreResult<Vec<FsckReport>> {
        Ok(vec![
            self.photos.fsck(force, progress, updates)?,
            self.viewpoints.fsck(force, progress, updates)?,
            self.activities.fsck(force, progress, updates)?,
            self.comments.fsck(force, progress, updates)?,
        ])
    }

    /// Entities held in memory across all tables.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.photos.cached_count()
            + self.viewpoints.cached_count()
            + self.activities.cached_count()
            + self.comments.cached_count()
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn post(tables: &Tables, db: &Database, viewpoint_id: i64, timestamp: f64, text: &str) -> i64 {
        let txn = db.new_transaction().unwrap();
        let mut comment = tables.comments.new_content(&txn).unwrap();
        comment.viewpoint_id = viewpoint_id;
        comment.timestamp = timestamp;
        comment.message = text.to_string();
        let id = comment.local_id();
        comment.save_and_unlock(&txn).unwrap();
        txn.commit().unwrap();
        id
    }

    #[test]
    fn comments_iterate_by_viewpoint_in_time_order() {
        let db = Database::open_in_memory().unwrap();
        let tables = Tables::new();
        let late = post(&tables, &db, 1, 300.0, "late");
        let early = post(&tables, &db, 1, 100.0, "early  ");
        let other = post(&tables, &db, 2, 200.0, "other viewpoint");

        let ids = comments_by_viewpoint(&db.handle(), 1, false)
            .unwrap()
            .collect_ids()
            .unwrap();
        assert_eq!(ids, vec![early, late]);

        let newest_first = comments_by_viewpoint(&db.handle(), 1, true)
            .unwrap()
            .collect_ids()
            .unwrap();
        assert_eq!(newest_first, vec![late, early]);

        let only = comments_by_viewpoint(&db.handle(), 2, false)
            .unwrap()
            .collect_ids()
            .unwrap();
        assert_eq!(only, vec![other]);

        let loaded = tables.comments.load(early, &db.handle()).unwrap().unwrap();
        assert_eq!(loaded.read(|c| c.message.clone()), "early");
    }

    #[test]
    fn share_activity_normalizes_photo_list() {
        let db = Database::open_in_memory().unwrap();
        let tables = Tables::new();
        let txn = db.new_transaction().unwrap();
        let mut activity = tables.activities.new_content(&txn).unwrap();
        activity.viewpoint_id = 4;
        activity.kind = ActivityKind::ShareNew {
            photo_ids: vec![3, 1, 3, 2],
        };
        let handle = activity.handle();
        activity.save_and_unlock(&txn).unwrap();
        txn.commit().unwrap();

        let kind = handle.read(|a| a.kind.clone());
        assert_eq!(kind, ActivityKind::ShareNew { photo_ids: vec![1, 2, 3] });
        let ids = activities_by_viewpoint(&db.handle(), 4, false)
            .unwrap()
            .collect_ids()
            .unwrap();
        assert_eq!(ids, vec![handle.local_id()]);
    }

    #[test]
    fn removed_viewpoints_leave_the_update_index() {
        let db = Database::open_in_memory().unwrap();
        let tables = Tables::new();
        let mut viewpoint = tables.viewpoints.new_content(&db.handle()).unwrap();
        viewpoint.last_updated = 10.0;
        viewpoint.save(&db.handle()).unwrap();
        assert_eq!(db.handle().count_prefix(VIEWPOINT_UPDATE_PREFIX).unwrap(), 1);

        viewpoint.removed = true;
        viewpoint.save_and_unlock(&db.handle()).unwrap();
        assert_eq!(db.handle().count_prefix(VIEWPOINT_UPDATE_PREFIX).unwrap(), 0);
    }

    #[test]
    fn fsck_covers_every_table() {
        let db = Database::open_in_memory().unwrap();
        let tables = Tables::new();
        let mut photo = tables.photos.new_content(&db.handle()).unwrap();
        photo.timestamp = 5.0;
        photo.save_and_unlock(&db.handle()).unwrap();
        db.handle().delete(
            shoebox_codec::KeyBuilder::with_prefix(PHOTO_TIMESTAMP_PREFIX)
                .f64(5.0)
                .i64(1)
                .build(),
        )
        .unwrap();

        let txn = db.new_transaction().unwrap();
        let reports = tables.fsck(false, None, &txn).unwrap();
        txn.commit().unwrap();

        assert_eq!(reports.len(), ALL_TABLES.len());
        assert_eq!(reports[0].index_entries_repaired, 1);
        assert!(reports.iter().all(|r| r.ran));
        let ids = photos_by_timestamp(&db.handle(), false).unwrap().collect_ids().unwrap();
        assert_eq!(ids, vec![1]);
    }
}
