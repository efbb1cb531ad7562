//! Repository for users, workspaces, file records and sync tasks.
//!
//! The sync ledger (tasks plus their per-file records) lives alongside the file
//! records because a task is scoped to a workspace and is cascade-deleted with
//! it; keeping one repository avoids handing the same pool around twice.

use crate::Database;
use crate::error::{Error, ErrorKind, Result};
use crate::models::{
    Environment, FileRecord, NewFileRecord, NewTaskRecord, RecordRow, SyncTask, SyncTaskRecord, TaskPage, TaskQuery,
    TaskRecordRow, TaskRow, TaskStatus, User, UserRow, Workspace, WorkspaceRow, to_i64,
};
use exn::{OptionExt, ResultExt};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use tracing::instrument;

const TASK_COLUMNS: &str = "t.id, t.workspace_id, t.creator_id, t.environment, t.status, t.total_files, \
                            t.failed_files, t.created_at, t.updated_at";

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Inspect a failed write for a constraint violation worth reporting on its
/// own, falling back to a generic database error.
#[track_caller]
fn constraint_error(
    err: sqlx::Error,
    on_unique: impl FnOnce() -> ErrorKind,
    on_foreign: impl FnOnce() -> ErrorKind,
) -> Error {
    let kind = match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => on_unique(),
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => on_foreign(),
        _ => ErrorKind::Database,
    };
    exn::Exn::from(err).raise(kind)
}

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn create_user(&self, username: impl AsRef<str>) -> Result<User> {
        let username = username.as_ref();
        let row: UserRow = sqlx::query_as(include_str!("../queries/insert_user.sql"))
            .bind(username)
            .bind(now())
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                constraint_error(err, || ErrorKind::Conflict(format!("username {username:?} is taken")), || ErrorKind::Database)
            })?;
        row.try_into()
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        let row: Option<UserRow> = sqlx::query_as(include_str!("../queries/get_user.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.ok_or_raise(|| ErrorKind::UserNotFound(id))?.try_into()
    }

    // =========================================================================
    // Workspaces
    // =========================================================================

    /// Create a workspace owned by `creator_id`.
    ///
    /// Workspace names are unique; a duplicate yields [`ErrorKind::Conflict`]
    /// and an unknown creator yields [`ErrorKind::UserNotFound`].
    pub async fn create_workspace(&self, name: impl AsRef<str>, creator_id: i64) -> Result<Workspace> {
        let name = name.as_ref();
        let now = now();
        let row: WorkspaceRow = sqlx::query_as(include_str!("../queries/insert_workspace.sql"))
            .bind(name)
            .bind(creator_id)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                constraint_error(
                    err,
                    || ErrorKind::Conflict(format!("workspace {name:?} already exists")),
                    || ErrorKind::UserNotFound(creator_id),
                )
            })?;
        row.try_into()
    }

    pub async fn get_workspace(&self, id: i64) -> Result<Workspace> {
        let row: Option<WorkspaceRow> = sqlx::query_as(include_str!("../queries/get_workspace.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.ok_or_raise(|| ErrorKind::WorkspaceNotFound(id))?.try_into()
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let rows: Vec<WorkspaceRow> = sqlx::query_as(include_str!("../queries/list_workspaces.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Workspace::try_from).collect()
    }

    /// Delete a workspace together with its file records and sync tasks.
    #[instrument(skip(self))]
    pub async fn delete_workspace(&self, id: i64) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/delete_workspace.sql"))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::WorkspaceNotFound(id));
        }
        Ok(())
    }

    // =========================================================================
    // File records
    // =========================================================================

    /// All file records of a workspace, newest first.
    pub async fn list_records(&self, workspace_id: i64) -> Result<Vec<FileRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(include_str!("../queries/list_records.sql"))
            .bind(workspace_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    pub async fn get_record(&self, workspace_id: i64, path: impl AsRef<str>) -> Result<FileRecord> {
        let path = path.as_ref();
        let row: Option<RecordRow> = sqlx::query_as(include_str!("../queries/get_record.sql"))
            .bind(workspace_id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.ok_or_raise(|| ErrorKind::RecordNotFound(workspace_id, path.to_string()))?.try_into()
    }

    /// Insert a file record, or update the existing record at the same
    /// `(workspace, path)` in place. Returns the stored row.
    pub async fn upsert_record(&self, record: &NewFileRecord) -> Result<FileRecord> {
        let now = now();
        let row: RecordRow = sqlx::query_as(include_str!("../queries/upsert_record.sql"))
            .bind(record.workspace_id)
            .bind(&record.path)
            .bind(&record.fingerprint)
            .bind(to_i64(record.size, "record size")?)
            .bind(record.modifier_id)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                constraint_error(err, || ErrorKind::Database, || ErrorKind::WorkspaceNotFound(record.workspace_id))
            })?;
        row.try_into()
    }

    // =========================================================================
    // Sync tasks
    // =========================================================================

    /// Persist a new task for `total_files` files with no failures yet.
    #[instrument(skip(self))]
    pub async fn create_task(
        &self,
        workspace_id: i64,
        creator_id: i64,
        environment: Environment,
        total_files: u64,
    ) -> Result<SyncTask> {
        let now = now();
        let row: TaskRow = sqlx::query_as(include_str!("../queries/insert_task.sql"))
            .bind(workspace_id)
            .bind(creator_id)
            .bind(environment.as_str())
            .bind(TaskStatus::Success.as_str())
            .bind(to_i64(total_files, "total files")?)
            .bind(0_i64)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| constraint_error(err, || ErrorKind::Database, || ErrorKind::WorkspaceNotFound(workspace_id)))?;
        row.try_into()
    }

    /// Write the task's counters and status back, refreshing `updated_at`.
    pub async fn save_task(&self, task: &mut SyncTask) -> Result<()> {
        let now =
            OffsetDateTime::now_utc().replace_nanosecond(0).or_raise(|| ErrorKind::InvalidData("task update date"))?;
        let result = sqlx::query(include_str!("../queries/update_task.sql"))
            .bind(task.status.as_str())
            .bind(to_i64(task.total_files, "total files")?)
            .bind(to_i64(task.failed_files, "failed files")?)
            .bind(now.unix_timestamp())
            .bind(task.id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::TaskNotFound(task.id));
        }
        task.updated_at = now;
        Ok(())
    }

    pub async fn get_task(&self, id: i64) -> Result<SyncTask> {
        let row: Option<TaskRow> = sqlx::query_as(include_str!("../queries/get_task.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.ok_or_raise(|| ErrorKind::TaskNotFound(id))?.try_into()
    }

    /// Delete a task and, by cascade, all of its per-file records.
    pub async fn delete_task(&self, id: i64) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/delete_task.sql"))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::TaskNotFound(id));
        }
        Ok(())
    }

    /// Persist the final outcome of one file within a task.
    ///
    /// Records are written exactly once; there is no update path.
    pub async fn create_task_record(&self, record: &NewTaskRecord) -> Result<SyncTaskRecord> {
        let now = now();
        let row: TaskRecordRow = sqlx::query_as(include_str!("../queries/insert_task_record.sql"))
            .bind(record.task_id)
            .bind(&record.path)
            .bind(&record.name)
            .bind(to_i64(record.size, "task record size")?)
            .bind(&record.fingerprint)
            .bind(record.last_modified.unix_timestamp())
            .bind(record.modifier_id)
            .bind(record.status().as_str())
            .bind(record.error_message())
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| constraint_error(err, || ErrorKind::Database, || ErrorKind::TaskNotFound(record.task_id)))?;
        row.try_into()
    }

    /// Per-file records of a task in the order they were written.
    pub async fn list_task_records(&self, task_id: i64) -> Result<Vec<SyncTaskRecord>> {
        let rows: Vec<TaskRecordRow> = sqlx::query_as(include_str!("../queries/list_task_records.sql"))
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(SyncTaskRecord::try_from).collect()
    }

    /// Paginated, filtered listing of sync tasks, newest first.
    ///
    /// Page numbers and sizes below one are treated as one.
    #[instrument(skip(self))]
    pub async fn query_tasks(&self, query: &TaskQuery) -> Result<TaskPage> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) ");
        push_task_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await.or_raise(|| ErrorKind::Database)?;

        let page = i64::from(query.page.max(1));
        let page_size = i64::from(query.page_size.max(1));
        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {TASK_COLUMNS} "));
        push_task_filters(&mut select, query);
        select.push(" ORDER BY t.created_at DESC, t.id DESC LIMIT ");
        select.push_bind(page_size);
        select.push(" OFFSET ");
        select.push_bind((page - 1) * page_size);
        let rows: Vec<TaskRow> =
            select.build_query_as().fetch_all(&self.pool).await.or_raise(|| ErrorKind::Database)?;

        Ok(TaskPage {
            total: u64::try_from(total).or_raise(|| ErrorKind::InvalidData("task count"))?,
            items: rows.into_iter().map(SyncTask::try_from).collect::<Result<Vec<_>>>()?,
        })
    }
}

fn push_task_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &TaskQuery) {
    builder.push("FROM sync_tasks t JOIN workspaces w ON w.id = t.workspace_id WHERE 1 = 1");
    if let Some(workspace_id) = query.workspace_id {
        builder.push(" AND t.workspace_id = ").push_bind(workspace_id);
    }
    if let Some(name) = &query.workspace_name {
        builder.push(" AND instr(w.name, ").push_bind(name.clone()).push(") > 0");
    }
    if let Some(status) = query.status {
        builder.push(" AND t.status = ").push_bind(status.as_str());
    }
    if let Some(start) = query.start_time {
        builder.push(" AND t.created_at >= ").push_bind(start.unix_timestamp());
    }
    if let Some(end) = query.end_time {
        builder.push(" AND t.created_at <= ").push_bind(end.unix_timestamp());
    }
    if let Some(name) = &query.file_name {
        builder
            .push(" AND EXISTS (SELECT 1 FROM sync_task_records r WHERE r.task_id = t.id AND instr(r.name, ")
            .push_bind(name.clone())
            .push(") > 0)");
    }
    if let Some(path) = &query.file_path {
        builder
            .push(" AND EXISTS (SELECT 1 FROM sync_task_records r WHERE r.task_id = t.id AND instr(r.path, ")
            .push_bind(path.clone())
            .push(") > 0)");
    }
    if let Some(modifier) = &query.modifier_name {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM sync_task_records r JOIN users u ON u.id = r.modifier_id \
                 WHERE r.task_id = t.id AND u.username = ",
            )
            .push_bind(modifier.clone())
            .push(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordStatus;
    use time::Duration;

    struct Fixture {
        repo: Repository,
        user: User,
        workspace: Workspace,
    }

    async fn fixture() -> Fixture {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let user = repo.create_user("alice").await.unwrap();
        let workspace = repo.create_workspace("assets", user.id).await.unwrap();
        Fixture { repo, user, workspace }
    }

    fn new_record(workspace_id: i64, path: &str, modifier_id: i64) -> NewFileRecord {
        NewFileRecord {
            workspace_id,
            path: path.to_string(),
            fingerprint: format!("fp-{path}"),
            size: 10,
            modifier_id,
        }
    }

    #[tokio::test]
    async fn test_duplicate_workspace_is_conflict() {
        let f = fixture().await;
        let err = f.repo.create_workspace("assets", f.user.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conflict(_)));
    }

    #[tokio::test]
    async fn test_workspace_with_unknown_creator() {
        let f = fixture().await;
        let err = f.repo.create_workspace("other", 999).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UserNotFound(999)));
    }

    #[tokio::test]
    async fn test_missing_entities_are_not_found() {
        let f = fixture().await;
        assert!(matches!(&*f.repo.get_workspace(42).await.unwrap_err(), ErrorKind::WorkspaceNotFound(42)));
        assert!(matches!(&*f.repo.get_user(42).await.unwrap_err(), ErrorKind::UserNotFound(42)));
        assert!(matches!(&*f.repo.get_task(42).await.unwrap_err(), ErrorKind::TaskNotFound(42)));
        let err = f.repo.get_record(f.workspace.id, "nope.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_upsert_updates_same_row() {
        let f = fixture().await;
        let first = f.repo.upsert_record(&new_record(f.workspace.id, "a/b.txt", f.user.id)).await.unwrap();
        let mut changed = new_record(f.workspace.id, "a/b.txt", f.user.id);
        changed.fingerprint = "updated".to_string();
        changed.size = 99;
        let second = f.repo.upsert_record(&changed).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.fingerprint, "updated");
        assert_eq!(second.size, 99);
        assert_eq!(f.repo.list_records(f.workspace.id).await.unwrap().len(), 1);
        assert_eq!(f.repo.get_record(f.workspace.id, "a/b.txt").await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_list_records_newest_first() {
        let f = fixture().await;
        for path in ["one.txt", "two.txt", "three.txt"] {
            f.repo.upsert_record(&new_record(f.workspace.id, path, f.user.id)).await.unwrap();
        }
        let paths: Vec<_> = f.repo.list_records(f.workspace.id).await.unwrap().into_iter().map(|r| r.path).collect();
        // Same-second inserts fall back to id ordering.
        assert_eq!(paths, vec!["three.txt", "two.txt", "one.txt"]);
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let f = fixture().await;
        let mut task = f.repo.create_task(f.workspace.id, f.user.id, Environment::Test, 2).await.unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.failed_files, 0);

        let ok = NewTaskRecord::new(task.id, "a.txt", "a.txt", 1, "x", OffsetDateTime::now_utc(), f.user.id);
        let mut bad = NewTaskRecord::new(task.id, "b.txt", "b.txt", 1, "y", OffsetDateTime::now_utc(), f.user.id);
        bad.fail("remote said no");
        f.repo.create_task_record(&ok).await.unwrap();
        f.repo.create_task_record(&bad).await.unwrap();
        task.record_failure();
        f.repo.save_task(&mut task).await.unwrap();

        let stored = f.repo.get_task(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::PartialSuccess);
        assert_eq!(stored.failed_files, 1);
        let records = f.repo.list_task_records(task.id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, RecordStatus::Success);
        assert_eq!(records[0].error_message, None);
        assert_eq!(records[1].status, RecordStatus::Failed);
        assert_eq!(records[1].error_message.as_deref(), Some("remote said no"));

        f.repo.delete_task(task.id).await.unwrap();
        assert!(f.repo.list_task_records(task.id).await.unwrap().is_empty());
        assert!(matches!(&*f.repo.delete_task(task.id).await.unwrap_err(), ErrorKind::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_workspace_cascades() {
        let f = fixture().await;
        f.repo.upsert_record(&new_record(f.workspace.id, "a.txt", f.user.id)).await.unwrap();
        let task = f.repo.create_task(f.workspace.id, f.user.id, Environment::Dev, 0).await.unwrap();
        f.repo.delete_workspace(f.workspace.id).await.unwrap();
        assert!(f.repo.list_records(f.workspace.id).await.unwrap().is_empty());
        assert!(f.repo.get_task(task.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_query_tasks_filters_and_pages() {
        let f = fixture().await;
        let bob = f.repo.create_user("bob").await.unwrap();
        let other = f.repo.create_workspace("website", bob.id).await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let task = f.repo.create_task(f.workspace.id, f.user.id, Environment::Dev, 1).await.unwrap();
            let record =
                NewTaskRecord::new(task.id, "img/logo.png", "logo.png", 1, "x", OffsetDateTime::now_utc(), f.user.id);
            f.repo.create_task_record(&record).await.unwrap();
            ids.push(task.id);
        }
        let mut failed = f.repo.create_task(other.id, bob.id, Environment::Prod, 1).await.unwrap();
        let mut record = NewTaskRecord::new(failed.id, "index.html", "index.html", 1, "y", OffsetDateTime::now_utc(), bob.id);
        record.fail("timeout");
        f.repo.create_task_record(&record).await.unwrap();
        failed.record_failure();
        f.repo.save_task(&mut failed).await.unwrap();

        let all = f.repo.query_tasks(&TaskQuery::default()).await.unwrap();
        assert_eq!(all.total, 4);
        assert_eq!(all.items[0].id, failed.id);

        let page = f.repo.query_tasks(&TaskQuery { page: 2, page_size: 2, ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.items.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ids[1], ids[0]]);

        let by_workspace =
            f.repo.query_tasks(&TaskQuery { workspace_name: Some("web".into()), ..Default::default() }).await.unwrap();
        assert_eq!(by_workspace.total, 1);

        let by_status =
            f.repo.query_tasks(&TaskQuery { status: Some(TaskStatus::Failed), ..Default::default() }).await.unwrap();
        assert_eq!(by_status.items.len(), 1);
        assert_eq!(by_status.items[0].environment, Environment::Prod);

        let by_name =
            f.repo.query_tasks(&TaskQuery { file_name: Some("logo".into()), ..Default::default() }).await.unwrap();
        assert_eq!(by_name.total, 3);

        let by_path =
            f.repo.query_tasks(&TaskQuery { file_path: Some("img/".into()), ..Default::default() }).await.unwrap();
        assert_eq!(by_path.total, 3);

        let by_modifier =
            f.repo.query_tasks(&TaskQuery { modifier_name: Some("bob".into()), ..Default::default() }).await.unwrap();
        assert_eq!(by_modifier.total, 1);

        let future = OffsetDateTime::now_utc() + Duration::hours(1);
        let none = f.repo.query_tasks(&TaskQuery { start_time: Some(future), ..Default::default() }).await.unwrap();
        assert_eq!(none.total, 0);
        assert!(none.items.is_empty());
    }
}
