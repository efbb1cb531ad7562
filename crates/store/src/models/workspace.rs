use crate::error::Error;
use crate::models::from_timestamp;
use serde::Serialize;
use time::OffsetDateTime;

/// A named container scoping a set of files and the sync tasks run against them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    pub creator_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct WorkspaceRow {
    id: i64,
    name: String,
    creator_id: i64,
    created_at: i64,
    updated_at: i64,
}
impl TryFrom<WorkspaceRow> for Workspace {
    type Error = Error;
    fn try_from(row: WorkspaceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            creator_id: row.creator_id,
            created_at: from_timestamp(row.created_at, "workspace creation date")?,
            updated_at: from_timestamp(row.updated_at, "workspace update date")?,
        })
    }
}
