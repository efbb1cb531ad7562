//! Local filesystem storage backend.
//!
//! Objects are plain files below a root directory, accessed via `tokio::fs`.
//! Workspace bytes are staged here before they are synchronized anywhere
//! else, and environments living on a mounted volume use it as their target.

use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_key;
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tokio::fs;

/// ```no_run
/// use wsync_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let staging = LocalBackend::new("staging", "/var/lib/wsync/staging")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Open a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidKey`](ErrorKind::InvalidKey) if the root is not
    /// absolute or exists but isn't a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let display = root.display().to_string();
        if !root.is_absolute() || (root.exists() && !root.is_dir()) {
            exn::bail!(ErrorKind::InvalidKey(display));
        }
        if !root.exists() {
            // Only runs once at startup, not worth an async constructor.
            sync_create_dir(&root).map_err(|e| io_error(e, &display))?;
        }
        Ok(Self { name: name.into(), root })
    }

    fn absolute_path(&self, key: &str) -> Result<PathBuf> {
        let validated = validate_key(key)?;
        Ok(validated.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

fn io_error(e: std::io::Error, key: &str) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(key.to_string()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(key.to_string()),
        _ => ErrorKind::Io(e),
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.absolute_path(key)?;
        Ok(fs::metadata(&path).await.is_ok_and(|metadata| metadata.is_file()))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.absolute_path(key)?;
        Ok(fs::read(&path).await.map_err(|e| io_error(e, key))?)
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.absolute_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(e, key))?;
        }
        tracing::debug!(backend = %self.name, key, bytes = data.len(), "writing object");
        Ok(fs::write(&path, data).await.map_err(|e| io_error(e, key))?)
    }
}
