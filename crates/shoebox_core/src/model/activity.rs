//! Activities: the event stream of a viewpoint.

use crate::content::{Content, ContentIterator, Identity, PrefixPolicy, TableSpec};
use crate::error::CoreResult;
use crate::kv::DbHandle;
use serde::{Deserialize, Serialize};
use shoebox_codec::KeyBuilder;

/// Activities by viewpoint, then time.
pub const ACTIVITY_VIEWPOINT_PREFIX: &str = "av/";

/// Activity table layout.
pub const ACTIVITY_TABLE: TableSpec = TableSpec {
    name: "activities",
    primary_prefix: "a/",
    server_prefix: "as/",
    index_prefixes: &[ACTIVITY_VIEWPOINT_PREFIX],
    fsck_version: 1,
};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    /// Photos were shared into the viewpoint.
    ShareNew {
        /// Shared photos.
        photo_ids: Vec<i64>,
    },
    /// Photos were added to an existing share.
    ShareExisting {
        /// Shared photos.
        photo_ids: Vec<i64>,
    },
    /// Followers were added.
    AddFollowers {
        /// Added users.
        user_ids: Vec<i64>,
    },
    /// A comment was posted.
    PostComment {
        /// The comment.
        comment_id: i64,
    },
    /// Viewpoint metadata changed.
    UpdateViewpoint,
}

/// One event in a viewpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Identity.
    pub identity: Identity,
    /// Viewpoint the activity belongs to.
    pub viewpoint_id: i64,
    /// Event time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Event payload.
    pub kind: ActivityKind,
    /// Set once the server has accepted the activity.
    pub uploaded: bool,
}

impl Content for Activity {
    fn with_local_id(local_id: i64) -> Self {
        Self {
            identity: Identity::local(local_id),
            viewpoint_id: 0,
            timestamp: 0.0,
            kind: ActivityKind::UpdateViewpoint,
            uploaded: false,
        }
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![KeyBuilder::with_prefix(ACTIVITY_VIEWPOINT_PREFIX)
            .i64(self.viewpoint_id)
            .f64(self.timestamp)
            .i64(self.identity.local_id())
            .build()]
    }

    fn save_hook(&mut self, _updates: &DbHandle) -> CoreResult<()> {
        match &mut self.kind {
            ActivityKind::ShareNew { photo_ids } | ActivityKind::ShareExisting { photo_ids } => {
                photo_ids.sort_unstable();
                photo_ids.dedup();
            }
            ActivityKind::AddFollowers { user_ids } => {
                user_ids.sort_unstable();
                user_ids.dedup();
            }
            ActivityKind::PostComment { .. } | ActivityKind::UpdateViewpoint => {}
        }
        Ok(())
    }
}

/// Activities of `viewpoint_id` in time order; newest first when `reverse`.
pub fn activities_by_viewpoint(
    db: &DbHandle,
    viewpoint_id: i64,
    reverse: bool,
) -> CoreResult<ContentIterator<PrefixPolicy>> {
    let prefix = KeyBuilder::with_prefix(ACTIVITY_VIEWPOINT_PREFIX)
        .i64(viewpoint_id)
        .build();
    ContentIterator::over_prefix(db, prefix, reverse)
}
