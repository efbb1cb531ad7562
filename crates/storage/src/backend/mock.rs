//! In-memory storage backend for tests.

use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_key;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// In-memory storage backend.
///
/// Writes to keys registered with [`rejecting`](Self::rejecting) fail with
/// a [`BackendError`](ErrorKind::BackendError), which is how tests simulate
/// a remote store refusing an upload.
///
/// ```ignore
/// let remote = MockBackend::with_objects([("1/a/b.txt", b"hello")]).rejecting(["a/c.txt"]);
/// assert!(remote.exists("1/a/b.txt").await?);
/// assert!(remote.write("a/c.txt", b"nope").await.is_err());
/// ```
pub struct MockBackend {
    name: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
    rejected: HashSet<String>,
}

impl MockBackend {
    /// Panics if any key fails validation: broken test setup should not pass.
    pub fn with_objects(objects: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let objects = objects.into_iter().map(|(key, data)| (Self::valid(key.into()), data.into())).collect();
        Self { name: "mock".to_string(), objects: RwLock::new(objects), rejected: HashSet::new() }
    }

    /// Make every write to one of these keys fail.
    pub fn rejecting(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.rejected.extend(keys.into_iter().map(|key| Self::valid(key.into())));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Snapshot of every stored key, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn valid(key: String) -> String {
        match validate_key(&key) {
            Ok(validated) => validated,
            Err(_) => panic!("MockBackend: invalid key {key}"),
        }
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::with_objects(Vec::<(String, Vec<u8>)>::new())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        Ok(self.objects.read().await.contains_key(&key))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let key = validate_key(key)?;
        let data = self.objects.read().await.get(&key).cloned();
        data.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key)))
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let key = validate_key(key)?;
        if self.rejected.contains(&key) {
            exn::bail!(ErrorKind::BackendError(format!("write rejected for {key}")));
        }
        self.objects.write().await.insert(key, data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let backend = MockBackend::with_objects([("a.txt", b"old".to_vec())]);
        backend.write("/a.txt", b"new").await.unwrap();
        assert_eq!(backend.read("a.txt").await.unwrap(), b"new");
        assert_eq!(backend.keys().await, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_read_missing() {
        let err = MockBackend::default().read("missing.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejected_write() {
        let backend = MockBackend::default().rejecting(["/a/c.txt"]);
        let err = backend.write("a/c.txt", b"data").await.unwrap_err();
        assert_eq!(err.to_string(), "backend error: write rejected for a/c.txt");
        assert!(!backend.exists("a/c.txt").await.unwrap());
        backend.write("a/b.txt", b"data").await.unwrap();
    }

    #[test]
    #[should_panic(expected = "invalid key")]
    fn test_invalid_setup_panics() {
        MockBackend::with_objects([("../escape", b"bad".to_vec())]);
    }
}
