//! Upload gateway: the only way file bytes leave for a target environment.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use wsync_storage::BackendHandle;
use wsync_storage::backend::ReadOnlyBackend;
use wsync_store::models::Environment;

pub type GatewayHandle = Arc<dyn UploadGateway + Send + Sync>;

/// Outcome of a single upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upload {
    Uploaded,
    /// The remote store (or the lack of one) refused the file. The message
    /// ends up verbatim in the per-file sync record.
    Failed(String),
}
impl Upload {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Uploaded)
    }
}

/// Pushes one file to the object store behind an environment.
///
/// Ordinary remote failures are reported as [`Upload::Failed`], never as
/// errors, and implementations must not retry on their own: every file gets
/// exactly one attempt per synchronization.
#[async_trait]
pub trait UploadGateway: Send + Sync {
    async fn upload(&self, path: &str, content: &[u8], environment: Environment) -> Upload;
}

/// An [`UploadGateway`] writing through a [`StorageBackend`](wsync_storage::StorageBackend)
/// per environment.
#[derive(Clone, Default)]
pub struct BackendGateway {
    targets: HashMap<Environment, BackendHandle>,
}
impl BackendGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, environment: Environment, backend: BackendHandle) -> Self {
        self.targets.insert(environment, backend);
        self
    }

    /// Wrap every target in a [`ReadOnlyBackend`]: uploads report success
    /// without anything being written.
    pub fn read_only(self) -> Self {
        let targets = self
            .targets
            .into_iter()
            .map(|(environment, backend)| (environment, Arc::new(ReadOnlyBackend::new(backend)) as BackendHandle))
            .collect();
        Self { targets }
    }

    pub fn target(&self, environment: Environment) -> Option<&BackendHandle> {
        self.targets.get(&environment)
    }
}

#[async_trait]
impl UploadGateway for BackendGateway {
    async fn upload(&self, path: &str, content: &[u8], environment: Environment) -> Upload {
        let Some(backend) = self.targets.get(&environment) else {
            return Upload::Failed(format!("no target configured for environment {environment}"));
        };
        let key = path.trim_start_matches('/');
        match backend.write(key, content).await {
            Ok(()) => {
                tracing::debug!(backend = backend.name(), %environment, key, bytes = content.len(), "uploaded");
                Upload::Uploaded
            },
            Err(err) => Upload::Failed((*err).to_string()),
        }
    }
}
