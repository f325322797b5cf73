//! Photos.

use crate::content::{Content, ContentIterator, Identity, PrefixPolicy, TableSpec};
use crate::error::CoreResult;
use crate::kv::DbHandle;
use serde::{Deserialize, Serialize};
use shoebox_codec::KeyBuilder;

/// Photos ordered by capture time.
pub const PHOTO_TIMESTAMP_PREFIX: &str = "pt/";

/// Photo table layout.
pub const PHOTO_TABLE: TableSpec = TableSpec {
    name: "photos",
    primary_prefix: "p/",
    server_prefix: "ps/",
    index_prefixes: &[PHOTO_TIMESTAMP_PREFIX],
    fsck_version: 1,
};

/// A photo's metadata. Image bytes live outside the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    /// Identity.
    pub identity: Identity,
    /// Capture time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Width over height.
    pub aspect_ratio: f64,
    /// Optional caption.
    pub caption: Option<String>,
    /// Episode the photo belongs to.
    pub episode_id: Option<i64>,
    /// Set once the photo has been uploaded.
    pub uploaded: bool,
}

impl Content for Photo {
    fn with_local_id(local_id: i64) -> Self {
        Self {
            identity: Identity::local(local_id),
            timestamp: 0.0,
            aspect_ratio: 1.0,
            caption: None,
            episode_id: None,
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
        vec![KeyBuilder::with_prefix(PHOTO_TIMESTAMP_PREFIX)
            .f64(self.timestamp)
            .i64(self.identity.local_id())
            .build()]
    }

    fn save_hook(&mut self, _updates: &DbHandle) -> CoreResult<()> {
        self.caption = self
            .caption
            .take()
            .map(|caption| caption.trim().to_string())
            .filter(|caption| !caption.is_empty());
        Ok(())
    }
}

/// Photos by capture time, newest first when `reverse`.
pub fn photos_by_timestamp(db: &DbHandle, reverse: bool) -> CoreResult<ContentIterator<PrefixPolicy>> {
    ContentIterator::over_prefix(db, PHOTO_TIMESTAMP_PREFIX, reverse)
}
