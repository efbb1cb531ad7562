//! Workspace file trees and partial-failure synchronization.
//!
//! - [`tree`] rebuilds the directory hierarchy of a workspace from its flat
//!   file records.
//! - [`records`] ingests file bytes into the staging area and records them.
//! - [`sync`] pushes a batch of staged files to a target environment through
//!   an [`UploadGateway`], keeping a durable outcome for every file.

pub mod error;
pub mod gateway;
pub mod records;
pub mod sync;
pub mod tree;

pub use crate::gateway::{BackendGateway, GatewayHandle, Upload, UploadGateway};
pub use crate::records::store_file;
pub use crate::tree::{FileTreeNode, get_file_tree, materialize};
use crate::error::{ErrorKind, Result};
use wsync_storage::BackendHandle;
use wsync_store::Repository;

/// Files in flight at once during a sync unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Everything an operation needs to reach the outside world.
#[derive(Clone)]
pub struct Context {
    pub repo: Repository,
    /// Holds the bytes of every workspace file, keyed `<workspace id>/<path>`.
    pub staging: BackendHandle,
    pub gateway: GatewayHandle,
    /// Upper bound on files processed concurrently within one sync; zero is
    /// treated as one.
    pub concurrency: usize,
}
impl Context {
    pub fn new(repo: Repository, staging: BackendHandle, gateway: GatewayHandle) -> Self {
        Self { repo, staging, gateway, concurrency: DEFAULT_CONCURRENCY }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Key of a workspace file inside the staging backend.
pub(crate) fn staging_key(workspace_id: i64, path: &str) -> String {
    format!("{workspace_id}/{}", path.trim_start_matches('/'))
}

/// Lift a record store result, keeping "does not exist" distinguishable.
pub(crate) fn lookup<T>(result: wsync_store::error::Result<T>) -> Result<T> {
    result.map_err(|err| {
        let kind = if err.is_not_found() { ErrorKind::NotFound } else { ErrorKind::Cache };
        err.raise(kind)
    })
}
