//! SQLite connection pool of the record store.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Sync runs write one outcome per file concurrently; a handful of
// connections keeps them from queueing on the pool.
const MAX_CONNECTIONS: u32 = 5;

/// The SQLite pool behind the record store. Reads and writes go through
/// [`crate::Repository`].
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .after_connect(|conn, _| Box::pin(tune(conn)))
            .max_connections(connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open (creating if missing) the store at `path` and bring its schema up
    /// to date.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = options().filename(path.as_ref()).create_if_missing(true);
        Self::open(options, MAX_CONNECTIONS).await
    }

    /// Like [`connect`](Self::connect), with a pool large enough for
    /// `concurrency` files in flight while someone else reads the task.
    ///
    /// A sync suspended between events keeps the connections of its
    /// in-flight files checked out, so a smaller pool starves any reader.
    pub async fn connect_for_sync(path: impl AsRef<Path>, concurrency: usize) -> Result<Self> {
        let options = options().filename(path.as_ref()).create_if_missing(true);
        Self::open(options, pool_size(concurrency)).await
    }

    /// A fresh, empty, migrated store living in memory. Available outside of
    /// `cfg(test)` for the tests of dependent crates.
    pub async fn connect_in_memory() -> Result<Self> {
        // Each in-memory connection would be a separate database.
        Self::open(options().filename(":memory:"), 1).await
    }

    #[instrument("migrating record store", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

/// One connection per file in flight, plus one for readers.
fn pool_size(concurrency: usize) -> u32 {
    u32::try_from(concurrency).unwrap_or(u32::MAX).saturating_add(1).max(MAX_CONNECTIONS)
}

fn options() -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        // Deleting a workspace or task cascades to its rows.
        .foreign_keys(true)
        .synchronous(SqliteSynchronous::Normal)
        // Outcome writes of one sync contend for the single WAL writer.
        .busy_timeout(Duration::from_millis(1500))
}

/// Per-connection settings that have no builder method. Applied on every
/// pooled connection, not just the first.
async fn tune(conn: &mut SqliteConnection) -> sqlx::Result<()> {
    sqlx::query("PRAGMA wal_autocheckpoint = 800; PRAGMA cache_size = -8192; PRAGMA temp_store = MEMORY;")
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[rstest]
    #[case(0, MAX_CONNECTIONS)]
    #[case(4, MAX_CONNECTIONS)]
    #[case(8, 9)]
    #[case(usize::MAX, u32::MAX)]
    fn test_pool_size(#[case] concurrency: usize, #[case] expected: u32) {
        assert_eq!(pool_size(concurrency), expected);
    }

    #[tokio::test]
    async fn test_pool_sized_for_sync() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect_for_sync(dir.path().join("wsync.sqlite"), 8).await.unwrap();
        assert_eq!(db.pool().options().get_max_connections(), 9);
        db.close().await;
        let db = Database::connect(dir.path().join("wsync.sqlite")).await.unwrap();
        assert_eq!(db.pool().options().get_max_connections(), MAX_CONNECTIONS);
        db.close().await;
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1);
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 800);
        db.close().await;
    }
}
