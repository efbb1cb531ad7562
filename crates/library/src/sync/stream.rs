use crate::Context;
use crate::error::{Error as LibraryError, ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::sync::error::{Error as SyncError, ErrorKind as SyncErrorKind, Result as SyncResult};
use crate::sync::file::{Batch, SyncFile, Tally, sync_file};
use async_stream::stream;
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use wsync_store::models::{Environment, SyncTask, SyncTaskRecord};

/// Progress events emitted by [`sync`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once, after the task was persisted.
/// 2. [`Synced`](Self::Synced): once per file whose outcome was recorded, in
///    completion order.
/// 3. [`Complete`](Self::Complete): exactly once, carrying the final task.
///
/// An error before [`Started`](Self::Started) ends the stream; errors after it
/// concern a single file and do not.
#[derive(Debug)]
pub enum SyncEvent {
    Started(SyncTask),
    Synced(SyncTaskRecord),
    Complete(SyncTask),
}

/// Synchronize `files` of a workspace to `environment`, streaming progress.
///
/// Each file is read from staging and uploaded exactly once, with up to
/// [`Context::concurrency`] files in flight. A file that cannot be read or
/// uploaded becomes a failed record and counts against the task; it never
/// stops the remaining files.
///
/// Fails before starting with [`NotFound`](LibraryErrorKind::NotFound) if the
/// workspace or actor does not exist.
pub fn sync<'a>(
    ctx: &'a Context,
    workspace_id: i64,
    environment: Environment,
    files: Vec<SyncFile>,
    actor_id: i64,
) -> impl Stream<Item = LibraryResult<SyncEvent>> + 'a {
    stream! {
        for await event in sync_inner(ctx, workspace_id, environment, files, actor_id) {
            yield event.map_err(lift);
        }
    }
}

fn lift(err: SyncError) -> LibraryError {
    let kind = match &*err {
        SyncErrorKind::NotFound => LibraryErrorKind::NotFound,
        SyncErrorKind::Cache => LibraryErrorKind::Sync,
    };
    err.raise(kind)
}

fn found<T>(result: wsync_store::error::Result<T>) -> SyncResult<T> {
    result.map_err(|err| {
        let kind = if err.is_not_found() { SyncErrorKind::NotFound } else { SyncErrorKind::Cache };
        err.raise(kind)
    })
}

fn sync_inner<'a>(
    ctx: &'a Context,
    workspace_id: i64,
    environment: Environment,
    files: Vec<SyncFile>,
    actor_id: i64,
) -> impl Stream<Item = SyncResult<SyncEvent>> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        let prepared = async {
            found(ctx.repo.get_workspace(workspace_id).await)?;
            found(ctx.repo.get_user(actor_id).await)?;
            let task = ctx
                .repo
                .create_task(workspace_id, actor_id, environment, files.len() as u64)
                .await
                .or_raise(|| SyncErrorKind::Cache)?;
            Ok::<_, SyncError>(task)
        };
        let task = match prepared.await {
            Ok(task) => task,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        tracing::info!(workspace = workspace_id, task = task.id, %environment, files = task.total_files, "sync started");
        yield Ok(SyncEvent::Started(task.clone()));

        let task_id = task.id;
        let tally = Mutex::new(Tally { task, stale: false });
        let batch = Batch { ctx, tally: &tally, task_id, workspace_id, environment, actor_id };

        let mut pending = files.into_iter().map(|file| sync_file(batch, file));
        let mut processing = FuturesUnordered::new();
        processing.extend(pending.by_ref().take(ctx.concurrency.max(1)));
        while let Some(result) = processing.next().await {
            yield result.map(SyncEvent::Synced);
            // Pop-n-push, FIFO.
            if let Some(next) = pending.next() {
                processing.push(next);
            }
        }
        drop(processing);
        drop(pending);

        let Tally { mut task, stale } = tally.into_inner();
        if stale {
            if let Err(e) = ctx.repo.save_task(&mut task).await.or_raise(|| SyncErrorKind::Cache) {
                yield Err(e);
            }
        }
        tracing::info!(
            workspace = workspace_id,
            task = task.id,
            %environment,
            status = %task.status,
            failed = task.failed_files,
            total = task.total_files,
            "sync complete"
        );
        yield Ok(SyncEvent::Complete(task));
    })
}
