use crate::error::Error;
use crate::models::{from_timestamp, to_u64};
use serde::Serialize;
use time::OffsetDateTime;

/// One persisted file inside a workspace.
///
/// There is at most one record per `(workspace_id, path)`; writing the same
/// path again updates this row in place rather than keeping history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub workspace_id: i64,
    /// Slash-separated, relative to the workspace root, no empty segments.
    pub path: String,
    pub fingerprint: String,
    pub size: u64,
    pub modifier_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The writable half of a [`FileRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRecord {
    pub workspace_id: i64,
    pub path: String,
    pub fingerprint: String,
    pub size: u64,
    pub modifier_id: i64,
}

#[derive(sqlx::FromRow)]
pub(crate) struct RecordRow {
    id: i64,
    workspace_id: i64,
    path: String,
    fingerprint: String,
    size: i64,
    modifier_id: i64,
    created_at: i64,
    updated_at: i64,
}
impl TryFrom<RecordRow> for FileRecord {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            workspace_id: row.workspace_id,
            path: row.path,
            fingerprint: row.fingerprint,
            size: to_u64(row.size, "record size")?,
            modifier_id: row.modifier_id,
            created_at: from_timestamp(row.created_at, "record creation date")?,
            updated_at: from_timestamp(row.updated_at, "record update date")?,
        })
    }
}
