//! Queued operation payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a queued operation. At most one operation per kind is in
/// flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpKind {
    /// Fetch new server state.
    Download,
    /// Upload a photo and its metadata.
    UploadPhoto,
    /// Push local viewpoint edits.
    UpdateViewpoint,
    /// Remove photos from the user's library.
    RemovePhotos,
    /// Upload a locally created activity.
    UploadActivity,
    /// Upload episode metadata.
    UploadEpisode,
}

impl OpKind {
    /// Every kind, in the order the driver services them.
    pub const ALL: [OpKind; 6] = [
        OpKind::Download,
        OpKind::UpdateViewpoint,
        OpKind::UploadActivity,
        OpKind::UploadEpisode,
        OpKind::UploadPhoto,
        OpKind::RemovePhotos,
    ];

    /// Stable name used in logs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Download => "download",
            OpKind::UploadPhoto => "upload_photo",
            OpKind::UpdateViewpoint => "update_viewpoint",
            OpKind::RemovePhotos => "remove_photos",
            OpKind::UploadActivity => "upload_activity",
            OpKind::UploadEpisode => "upload_episode",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity an operation was queued for. Re-queueing the same target
/// moves its entry instead of adding a second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueTarget {
    /// Table name, e.g. `photos`.
    pub table: String,
    /// Local id within the table.
    pub local_id: i64,
}

impl QueueTarget {
    /// Creates a target.
    pub fn new(table: impl Into<String>, local_id: i64) -> Self {
        Self {
            table: table.into(),
            local_id,
        }
    }
}

impl fmt::Display for QueueTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.local_id)
    }
}

/// A pending outbound operation, stored CBOR-encoded as a queue entry value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOp {
    /// Operation category.
    pub kind: OpKind,
    /// Entity the operation was queued for, if any.
    pub target: Option<QueueTarget>,
    /// Further local ids the operation covers, such as removed photos.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_ids: Vec<i64>,
}

impl NetworkOp {
    /// An operation without a target.
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            target: None,
            local_ids: Vec::new(),
        }
    }

    /// An operation queued for `target`.
    pub fn for_target(kind: OpKind, target: QueueTarget) -> Self {
        Self {
            kind,
            target: Some(target),
            local_ids: Vec::new(),
        }
    }

    /// Removal of `photo_ids` from the library.
    pub fn remove_photos(photo_ids: impl IntoIterator<Item = i64>) -> Self {
        let mut local_ids: Vec<i64> = photo_ids.into_iter().collect();
        local_ids.sort_unstable();
        local_ids.dedup();
        Self {
            kind: OpKind::RemovePhotos,
            target: None,
            local_ids,
        }
    }
}
