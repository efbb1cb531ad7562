//! Read-only storage backend.
//!
//! Wraps another backend and drops writes while reporting success. A sync
//! against a read-only target walks every file and records every outcome
//! without touching the remote store.

use crate::error::Result;
use crate::{BackendHandle, StorageBackend};
use async_trait::async_trait;

#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        tracing::info!(backend = self.inner.name(), key, bytes = data.len(), "skipping write in read-only mode");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_writes_are_dropped() {
        let inner = Arc::new(MockBackend::with_objects([("kept.txt", b"data".to_vec())]).with_name("prod"));
        let backend = ReadOnlyBackend::new(inner.clone());
        backend.write("new.txt", b"data").await.unwrap();
        assert_eq!(backend.name(), "prod");
        assert_eq!(inner.keys().await, vec!["kept.txt"]);
        assert_eq!(backend.read("kept.txt").await.unwrap(), b"data");
    }
}
