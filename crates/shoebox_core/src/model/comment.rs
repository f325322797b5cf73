//! Comments posted to viewpoints.

use crate::content::{Content, ContentIterator, Identity, PrefixPolicy, TableSpec};
use crate::error::CoreResult;
use crate::kv::DbHandle;
use serde::{Deserialize, Serialize};
use shoebox_codec::KeyBuilder;

/// Comments by viewpoint, then time.
pub const COMMENT_VIEWPOINT_PREFIX: &str = "cv/";

/// Comment table layout.
pub const COMMENT_TABLE: TableSpec = TableSpec {
    name: "comments",
    primary_prefix: "c/",
    server_prefix: "cs/",
    index_prefixes: &[COMMENT_VIEWPOINT_PREFIX],
    fsck_version: 1,
};

/// A comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Identity.
    pub identity: Identity,
    /// Viewpoint the comment was posted to.
    pub viewpoint_id: i64,
    /// Post time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Comment text.
    pub message: String,
    /// Photo the comment refers to.
    pub asset_id: Option<i64>,
}

impl Content for Comment {
    fn with_local_id(local_id: i64) -> Self {
        Self {
            identity: Identity::local(local_id),
            viewpoint_id: 0,
            timestamp: 0.0,
            message: String::new(),
            asset_id: None,
        }
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }

    fn index_keys(&self) -> Vec<Vec<u8>> {
        vec![KeyBuilder::with_prefix(COMMENT_VIEWPOINT_PREFIX)
            .i64(self.viewpoint_id)
            .f64(self.timestamp)
            .i64(self.identity.local_id())
            .build()]
    }

    fn save_hook(&mut self, _updates: &DbHandle) -> CoreResult<()> {
        let trimmed = self.message.trim_end();
        if trimmed.len() != self.message.len() {
            self.message = trimmed.to_string();
        }
        Ok(())
    }
}

/// Comments of `viewpoint_id` in time order; newest first when `reverse`.
pub fn comments_by_viewpoint(
    db: &DbHandle,
    viewpoint_id: i64,
    reverse: bool,
) -> CoreResult<ContentIterator<PrefixPolicy>> {
    let prefix = KeyBuilder::with_prefix(COMMENT_VIEWPOINT_PREFIX)
        .i64(viewpoint_id)
        .build();
    ContentIterator::over_prefix(db, prefix, reverse)
}
