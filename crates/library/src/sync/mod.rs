//! Sync task orchestration.
//!
//! Pushes a batch of staged workspace files to a target environment through
//! the [`UploadGateway`](crate::UploadGateway) and keeps a durable ledger of
//! the attempt: one [`SyncTask`] for the batch, one [`SyncTaskRecord`] per
//! file. Failure is data at the batch level. A batch in which every upload
//! failed still produces a task, with status [`Failed`](wsync_store::models::TaskStatus::Failed).
//!
//! The task status only ever moves `Success` to `PartialSuccess` to `Failed`,
//! and is persisted after every failed file so anyone polling the task sees
//! it degrade in real time.
//!
//! The primary entry point is [`sync`], streaming a [`SyncEvent`] per step;
//! [`synchronize`] drains that stream for callers only interested in the
//! final task.

pub mod error;
mod file;
mod stream;

pub use self::file::SyncFile;
pub use self::stream::{SyncEvent, sync};
use crate::error::{ErrorKind, Result};
use crate::{Context, lookup};
use futures::StreamExt;
use serde::Serialize;
use std::pin::pin;
use wsync_store::models::{Environment, SyncTask, SyncTaskRecord};

/// Run a sync to completion and return the final task.
///
/// Outcomes that could not be recorded are logged and skipped; they are not
/// counted as failures. Only a sync that never started is an error.
pub async fn synchronize(
    ctx: &Context,
    workspace_id: i64,
    environment: Environment,
    files: Vec<SyncFile>,
    actor_id: i64,
) -> Result<SyncTask> {
    let mut events = pin!(sync(ctx, workspace_id, environment, files, actor_id));
    let mut started = false;
    while let Some(event) = events.next().await {
        match event {
            Ok(SyncEvent::Started(_)) => started = true,
            Ok(SyncEvent::Synced(_)) => {},
            Ok(SyncEvent::Complete(task)) => return Ok(task),
            Err(err) if started => tracing::error!(workspace = workspace_id, error = ?err, "sync outcome not recorded"),
            Err(err) => return Err(err),
        }
    }
    exn::bail!(ErrorKind::Sync)
}

/// A task together with its per-file outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: SyncTask,
    pub records: Vec<SyncTaskRecord>,
}

/// Fetch a task and its records, in the order they were written.
pub async fn task_detail(ctx: &Context, task_id: i64) -> Result<TaskDetail> {
    let task = lookup(ctx.repo.get_task(task_id).await)?;
    let records = lookup(ctx.repo.list_task_records(task_id).await)?;
    Ok(TaskDetail { task, records })
}
