mod record;
mod task;
mod user;
mod workspace;

pub use self::record::{FileRecord, NewFileRecord};
pub use self::task::{
    Environment, NewTaskRecord, RecordStatus, SyncTask, SyncTaskRecord, TaskPage, TaskQuery, TaskStatus,
    UnknownEnvironment,
};
pub use self::user::User;
pub use self::workspace::Workspace;

pub(crate) use self::record::RecordRow;
pub(crate) use self::task::{TaskRecordRow, TaskRow};
pub(crate) use self::user::UserRow;
pub(crate) use self::workspace::WorkspaceRow;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::OffsetDateTime;

/// Timestamps are stored as unix seconds; sub-second precision is dropped.
pub(crate) fn from_timestamp(seconds: i64, field: &'static str) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(seconds).or_raise(|| ErrorKind::InvalidData(field))
}

pub(crate) fn to_i64(value: u64, field: &'static str) -> Result<i64> {
    i64::try_from(value).or_raise(|| ErrorKind::InvalidData(field))
}

pub(crate) fn to_u64(value: i64, field: &'static str) -> Result<u64> {
    u64::try_from(value).or_raise(|| ErrorKind::InvalidData(field))
}
