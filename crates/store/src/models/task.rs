use crate::error::{Error, ErrorKind};
use crate::models::{from_timestamp, to_u64};
use derive_more::{Display, Error as DeriveError};
use exn::{OptionExt, ResultExt};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;

/// Deployment destination a batch of files is synchronized toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Test,
    Prod,
}
impl Environment {
    pub const ALL: [Self; 3] = [Self::Dev, Self::Test, Self::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        }
    }
}
impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Display, DeriveError)]
#[display("unknown environment: {_0:?} (expected one of dev, test, prod)")]
pub struct UnknownEnvironment(#[error(not(source))] pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" => Ok(Self::Prod),
            _ => Err(UnknownEnvironment(s.to_string())),
        }
    }
}

/// Aggregate outcome of a sync task.
///
/// Always derived from `(total_files, failed_files)`, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    PartialSuccess,
    Failed,
}
impl TaskStatus {
    pub fn from_counts(total: u64, failed: u64) -> Self {
        match failed {
            0 => Self::Success,
            failed if failed >= total => Self::Failed,
            _ => Self::PartialSuccess,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "partial_success" => Some(Self::PartialSuccess),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for TaskStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_raise(|| ErrorKind::InvalidData("task status"))
    }
}

/// Per-file outcome within a sync task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Success,
    Failed,
}
impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synchronization batch and its aggregate outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncTask {
    pub id: i64,
    pub workspace_id: i64,
    pub creator_id: i64,
    pub environment: Environment,
    pub status: TaskStatus,
    pub total_files: u64,
    pub failed_files: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
impl SyncTask {
    /// Count one more failed file and recompute the status.
    ///
    /// The status can only get worse: `Success` to `PartialSuccess` to
    /// `Failed`. Failures beyond `total_files` are ignored so the counter
    /// never exceeds the total.
    pub fn record_failure(&mut self) {
        if self.failed_files < self.total_files {
            self.failed_files += 1;
        }
        self.status = TaskStatus::from_counts(self.total_files, self.failed_files);
    }
}

/// A per-file outcome that has not been persisted yet.
///
/// Starts out as a provisional success; [`NewTaskRecord::fail`] flips it to a
/// failure carrying the causing error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskRecord {
    pub task_id: i64,
    pub path: String,
    pub name: String,
    pub size: u64,
    pub fingerprint: String,
    pub last_modified: OffsetDateTime,
    pub modifier_id: i64,
    status: RecordStatus,
    error_message: Option<String>,
}
impl NewTaskRecord {
    pub fn new(
        task_id: i64,
        path: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        fingerprint: impl Into<String>,
        last_modified: OffsetDateTime,
        modifier_id: i64,
    ) -> Self {
        Self {
            task_id,
            path: path.into(),
            name: name.into(),
            size,
            fingerprint: fingerprint.into(),
            last_modified,
            modifier_id,
            status: RecordStatus::Success,
            error_message: None,
        }
    }

    /// Mark the outcome as failed. An empty message is replaced with a generic
    /// one so a failed record always explains itself.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = RecordStatus::Failed;
        self.error_message = Some(if message.trim().is_empty() { "unknown error".to_string() } else { message });
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// The persisted outcome of one file within one sync task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncTaskRecord {
    pub id: i64,
    pub task_id: i64,
    pub path: String,
    pub name: String,
    pub size: u64,
    pub fingerprint: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    pub modifier_id: i64,
    pub status: RecordStatus,
    /// Present if and only if `status` is [`RecordStatus::Failed`].
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Filters and pagination for listing sync tasks.
///
/// Text filters are case-sensitive substring matches. The file filters match
/// tasks containing at least one record with a matching name or path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQuery {
    pub workspace_id: Option<i64>,
    pub workspace_name: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    /// Matched exactly against the username of any contained record's modifier.
    pub modifier_name: Option<String>,
    pub status: Option<TaskStatus>,
    /// Inclusive lower bound on the task creation time.
    pub start_time: Option<OffsetDateTime>,
    /// Inclusive upper bound on the task creation time.
    pub end_time: Option<OffsetDateTime>,
    /// One-based page number.
    pub page: u32,
    pub page_size: u32,
}
impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            workspace_id: None,
            workspace_name: None,
            file_name: None,
            file_path: None,
            modifier_name: None,
            status: None,
            start_time: None,
            end_time: None,
            page: 1,
            page_size: 20,
        }
    }
}

/// One page of sync tasks, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskPage {
    /// Number of tasks matching the filters across all pages.
    pub total: u64,
    pub items: Vec<SyncTask>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct TaskRow {
    id: i64,
    workspace_id: i64,
    creator_id: i64,
    environment: String,
    status: String,
    total_files: i64,
    failed_files: i64,
    created_at: i64,
    updated_at: i64,
}
impl TryFrom<TaskRow> for SyncTask {
    type Error = Error;
    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            workspace_id: row.workspace_id,
            creator_id: row.creator_id,
            environment: row.environment.parse::<Environment>().or_raise(|| ErrorKind::InvalidData("task environment"))?,
            status: row.status.parse::<TaskStatus>()?,
            total_files: to_u64(row.total_files, "total files")?,
            failed_files: to_u64(row.failed_files, "failed files")?,
            created_at: from_timestamp(row.created_at, "task creation date")?,
            updated_at: from_timestamp(row.updated_at, "task update date")?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TaskRecordRow {
    id: i64,
    task_id: i64,
    path: String,
    name: String,
    size: i64,
    fingerprint: String,
    last_modified: i64,
    modifier_id: i64,
    status: String,
    error_message: Option<String>,
    created_at: i64,
    updated_at: i64,
}
impl TryFrom<TaskRecordRow> for SyncTaskRecord {
    type Error = Error;
    fn try_from(row: TaskRecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            task_id: row.task_id,
            path: row.path,
            name: row.name,
            size: to_u64(row.size, "task record size")?,
            fingerprint: row.fingerprint,
            last_modified: from_timestamp(row.last_modified, "task record modification date")?,
            modifier_id: row.modifier_id,
            status: RecordStatus::parse(&row.status).ok_or_raise(|| ErrorKind::InvalidData("task record status"))?,
            error_message: row.error_message,
            created_at: from_timestamp(row.created_at, "task record creation date")?,
            updated_at: from_timestamp(row.updated_at, "task record update date")?,
        })
    }
}
