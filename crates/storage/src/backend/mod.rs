//! Storage backend trait and implementations.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod ro;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
pub use self::ro::ReadOnlyBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::Result;
use async_trait::async_trait;

/// Byte blobs addressed by key.
///
/// Keys are relative to the backend root. Implementations run every key
/// through [`validate_key`](crate::validate_key) themselves, so callers may
/// pass raw workspace paths such as `/a/b.txt`.
///
/// ```
/// use wsync_storage::{backend::StorageBackend, error::Result};
///
/// async fn copy(from: &dyn StorageBackend, to: &dyn StorageBackend, key: &str) -> Result<usize> {
///     let data = from.read(key).await?;
///     to.write(key, &data).await?;
///     Ok(data.len())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, for logging only.
    fn name(&self) -> &str;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Create or overwrite an object. Filesystem backends create parent
    /// directories as needed.
    async fn write(&self, key: &str, data: &[u8]) -> Result<()>;
}
