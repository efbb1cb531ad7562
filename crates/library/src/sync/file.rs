use crate::gateway::Upload;
use crate::sync::error::{ErrorKind, Result};
use crate::{Context, staging_key};
use exn::ResultExt;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use wsync_storage::file_name;
use wsync_store::models::{Environment, FileRecord, NewTaskRecord, RecordStatus, SyncTask, SyncTaskRecord};

/// Descriptor of one file to synchronize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFile {
    /// Path within the workspace; a leading separator is ignored.
    pub path: String,
    pub name: String,
    pub size: u64,
    pub fingerprint: String,
    /// Defaults to the time the file is processed.
    pub last_modified: Option<OffsetDateTime>,
}
impl SyncFile {
    pub fn new(path: impl Into<String>, size: u64, fingerprint: impl Into<String>) -> Self {
        let path = path.into();
        let name = file_name(&path).to_string();
        Self { path, name, size, fingerprint: fingerprint.into(), last_modified: None }
    }

    pub fn last_modified(mut self, at: OffsetDateTime) -> Self {
        self.last_modified = Some(at);
        self
    }
}
impl From<&FileRecord> for SyncFile {
    fn from(record: &FileRecord) -> Self {
        Self::new(&record.path, record.size, &record.fingerprint).last_modified(record.updated_at)
    }
}

/// The task as known to the running sync. `stale` is set when a save of the
/// task row failed and the stored counters lag behind.
pub(crate) struct Tally {
    pub(crate) task: SyncTask,
    pub(crate) stale: bool,
}

/// Everything a single file needs besides its own descriptor.
#[derive(Clone, Copy)]
pub(crate) struct Batch<'a> {
    pub(crate) ctx: &'a Context,
    pub(crate) tally: &'a Mutex<Tally>,
    pub(crate) task_id: i64,
    pub(crate) workspace_id: i64,
    pub(crate) environment: Environment,
    pub(crate) actor_id: i64,
}

/// Attempt one file exactly once and persist its outcome.
///
/// A failed attempt is counted against the task, and the task row is saved
/// while the tally lock is still held so the stored status never improves.
/// An error here means the outcome could not be recorded; the file is then
/// neither counted as succeeded nor as failed.
pub(crate) async fn sync_file(batch: Batch<'_>, file: SyncFile) -> Result<SyncTaskRecord> {
    let mut record = NewTaskRecord::new(
        batch.task_id,
        &file.path,
        &file.name,
        file.size,
        &file.fingerprint,
        file.last_modified.unwrap_or_else(OffsetDateTime::now_utc),
        batch.actor_id,
    );
    match transfer(batch, &file.path).await {
        Upload::Uploaded => {
            tracing::info!(
                workspace = batch.workspace_id,
                task = batch.task_id,
                path = %file.path,
                environment = %batch.environment,
                "file synced"
            );
        },
        Upload::Failed(message) => {
            tracing::warn!(
                workspace = batch.workspace_id,
                task = batch.task_id,
                path = %file.path,
                environment = %batch.environment,
                error = %message,
                "file failed to sync"
            );
            record.fail(message);
        },
    }

    let stored = batch.ctx.repo.create_task_record(&record).await.or_raise(|| ErrorKind::Cache)?;
    if stored.status == RecordStatus::Failed {
        let mut tally = batch.tally.lock().await;
        tally.task.record_failure();
        if let Err(err) = batch.ctx.repo.save_task(&mut tally.task).await {
            tracing::warn!(task = batch.task_id, error = ?err, "could not save sync task, retrying on completion");
            tally.stale = true;
        }
    }
    Ok(stored)
}

/// Read the staged bytes and hand them to the gateway. Being unable to read
/// the bytes is reported the same way as a refused upload.
async fn transfer(batch: Batch<'_>, path: &str) -> Upload {
    let content = match batch.ctx.staging.read(&staging_key(batch.workspace_id, path)).await {
        Ok(content) => content,
        Err(err) => return Upload::Failed(format!("could not read staged file: {}", *err)),
    };
    batch.ctx.gateway.upload(path, &content, batch.environment).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a/b.txt", "b.txt")]
    #[case("/top.png", "top.png")]
    #[case("dir/", "dir")]
    #[case("plain", "plain")]
    fn test_name_is_last_segment(#[case] path: &str, #[case] name: &str) {
        assert_eq!(SyncFile::new(path, 0, "").name, name);
    }
}
