use crate::error::Error;
use crate::models::from_timestamp;
use serde::Serialize;
use time::OffsetDateTime;

/// An actor that creates workspaces, writes files and starts syncs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: i64,
    username: String,
    created_at: i64,
}
impl TryFrom<UserRow> for User {
    type Error = Error;
    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            username: row.username,
            created_at: from_timestamp(row.created_at, "user creation date")?,
        })
    }
}
