//! Viewpoints: shared albums and conversations.

use crate::content::{Content, ContentIterator, Identity, PrefixPolicy, TableSpec};
use crate::error::CoreResult;
use crate::kv::DbHandle;
use serde::{Deserialize, Serialize};
use shoebox_codec::KeyBuilder;

/// Viewpoints ordered by last update.
pub const VIEWPOINT_UPDATE_PREFIX: &str = "vu/";

/// Viewpoint table layout.
pub const VIEWPOINT_TABLE: TableSpec = TableSpec {
    name: "viewpoints",
    primary_prefix: "v/",
    server_prefix: "vs/",
    index_prefixes: &[VIEWPOINT_UPDATE_PREFIX],
    fsck_version: 1,
};

/// A conversation or album shared between followers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    /// Identity.
    pub identity: Identity,
    /// Title, if any.
    pub title: Option<String>,
    /// Time of the last activity, seconds since the Unix epoch.
    pub last_updated: f64,
    /// Photo shown as the cover.
    pub cover_photo_id: Option<i64>,
    /// Set when the user removed the viewpoint from their inbox.
    pub removed: bool,
}

impl Content for Viewpoint {
    fn with_local_id(local_id: i64) -> Self {
        Self {
            identity: Identity::local(local_id),
            title: None,
            last_updated: 0.0,
            cover_photo_id: None,
            removed: false,
        }
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        if self.removed {
            return Vec::new();
        }
        vec![KeyBuilder::with_prefix(VIEWPOINT_UPDATE_PREFIX)
            .f64(self.last_updated)
            .i64(self.identity.local_id())
            .build()]
    }
}

/// Viewpoints that are not removed, by last update; most recent first when
/// `reverse`.
pub fn viewpoints_by_update_time(
    db: &DbHandle,
    reverse: bool,
) -> CoreResult<ContentIterator<PrefixPolicy>> {
    ContentIterator::over_prefix(db, VIEWPOINT_UPDATE_PREFIX, reverse)
}
