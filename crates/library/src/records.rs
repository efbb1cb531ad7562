//! Ingestion of file bytes into a workspace.

use crate::error::{ErrorKind, Result};
use crate::{Context, lookup, staging_key};
use exn::ResultExt;
use wsync_storage::validate_key;
use wsync_store::models::{FileRecord, NewFileRecord};

/// Write `content` to `path` inside a workspace on behalf of `actor_id`.
///
/// The bytes go to the staging backend first and the record is upserted
/// second, so a record never points at bytes that were not written. Writing
/// the same path again replaces the bytes and updates the existing record.
#[tracing::instrument(skip(ctx, content), fields(bytes = content.len()))]
pub async fn store_file(
    ctx: &Context,
    workspace_id: i64,
    path: &str,
    content: &[u8],
    actor_id: i64,
) -> Result<FileRecord> {
    let path = validate_key(path).or_raise(|| ErrorKind::InvalidPath)?;
    lookup(ctx.repo.get_workspace(workspace_id).await)?;
    lookup(ctx.repo.get_user(actor_id).await)?;

    ctx.staging.write(&staging_key(workspace_id, &path), content).await.or_raise(|| ErrorKind::Storage)?;
    let record = NewFileRecord {
        workspace_id,
        path,
        fingerprint: blake3::hash(content).to_hex().to_string(),
        size: content.len() as u64,
        modifier_id: actor_id,
    };
    let stored = lookup(ctx.repo.upsert_record(&record).await)?;
    tracing::info!(workspace = workspace_id, path = %stored.path, size = stored.size, "file stored");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendGateway;
    use std::sync::Arc;
    use wsync_storage::StorageBackend;
    use wsync_storage::backend::MockBackend;
    use wsync_store::{Database, Repository};

    async fn context() -> (Context, Arc<MockBackend>, i64, i64) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let user = repo.create_user("alice").await.unwrap();
        let workspace = repo.create_workspace("assets", user.id).await.unwrap();
        let staging = Arc::new(MockBackend::default());
        let ctx = Context::new(repo, staging.clone(), Arc::new(BackendGateway::new()));
        (ctx, staging, workspace.id, user.id)
    }

    #[tokio::test]
    async fn test_store_and_overwrite() {
        let (ctx, staging, workspace, actor) = context().await;
        let first = store_file(&ctx, workspace, "a/b.txt", b"one", actor).await.unwrap();
        assert_eq!(first.size, 3);
        assert_eq!(first.fingerprint, blake3::hash(b"one").to_hex().to_string());
        assert_eq!(staging.read(&format!("{workspace}/a/b.txt")).await.unwrap(), b"one");

        let second = store_file(&ctx, workspace, "/a//b.txt", b"second", actor).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.path, "a/b.txt");
        assert_eq!(second.size, 6);
        assert_ne!(second.fingerprint, first.fingerprint);
        assert_eq!(ctx.repo.list_records(workspace).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_escaping_path() {
        let (ctx, staging, workspace, actor) = context().await;
        let err = store_file(&ctx, workspace, "../other/secret.txt", b"x", actor).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath));
        assert!(staging.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_workspace_or_actor() {
        let (ctx, _staging, workspace, actor) = context().await;
        let err = store_file(&ctx, workspace + 1, "a.txt", b"x", actor).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound));
        let err = store_file(&ctx, workspace, "a.txt", b"x", actor + 1).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound));
    }
}
