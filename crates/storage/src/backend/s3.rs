//! S3-compatible storage backend.
//!
//! Deployment environments are usually a bucket on AWS S3 or a compatible
//! service (MinIO, Aliyun OSS, Backblaze B2). Credentials come from the
//! environment's entry in the configuration file.

use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, validate_key};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, retry::RetryConfig};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use exn::ResultExt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Upper bound on in-flight requests per backend, shared by every sync using it.
const MAX_CONCURRENT_REQUESTS: usize = 64;

/// Objects in a bucket, optionally below a key prefix.
///
/// ```no_run
/// use wsync_storage::backend::S3Backend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prod = S3Backend::new(
///     "prod",
///     "assets-prod",
///     Some("static".to_string()),
///     "eu-west-1",
///     None::<String>,
///     "access_key_id",
///     "secret_access_key",
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    requests: Arc<Semaphore>,
}

impl S3Backend {
    /// `endpoint` selects an S3-compatible service; requests then use
    /// path-style addressing.
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let credentials = Credentials::new(key_id, key_secret, None, None, "wsync-config");
        let mut config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            // Backoff lives in the SDK. A sync never retries an upload itself.
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            .force_path_style(true);
        if let Some(endpoint) = endpoint {
            config = config.endpoint_url(endpoint);
        }
        Self::from_client(name, Client::from_conf(config.build()), bucket, prefix)
    }

    /// Wrap an already configured client.
    pub fn from_client(
        name: impl Into<String>,
        client: Client,
        bucket: impl Into<String>,
        prefix: Option<String>,
    ) -> Result<Self> {
        let prefix = prefix.map(validate_key).transpose()?;
        Ok(Self {
            name: name.into(),
            client,
            bucket: bucket.into(),
            prefix,
            requests: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        })
    }

    fn full_key(&self, key: &str) -> Result<String> {
        let validated = validate_key(key)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{validated}"),
            None => validated,
        })
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit> {
        self.requests
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError(format!("request limiter of {} closed", self.name)))
    }

    fn sdk_error<E, R>(err: &SdkError<E, R>) -> ErrorKind
    where
        E: std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        ErrorKind::Network(DisplayErrorContext(err).to_string())
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_key = self.full_key(key)?;
        let _permit = self.permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&full_key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => exn::bail!(Self::sdk_error(&err)),
        }
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let full_key = self.full_key(key)?;
        let _permit = self.permit().await?;
        let output = match self.client.get_object().bucket(&self.bucket).key(&full_key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(key.to_string()))
            },
            Err(err) => exn::bail!(Self::sdk_error(&err)),
        };
        let bytes = output.body.collect().await.or_raise(|| ErrorKind::Network(format!("reading body of {key}")))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_key = self.full_key(key)?;
        let _permit = self.permit().await?;
        tracing::debug!(backend = %self.name, bucket = %self.bucket, key = %full_key, bytes = data.len(), "uploading object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|err| Self::sdk_error(&err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::operation::get_object::{GetObjectError, GetObjectOutput};
    use aws_sdk_s3::operation::head_object::{HeadObjectError, HeadObjectOutput};
    use aws_sdk_s3::operation::put_object::PutObjectOutput;
    use aws_sdk_s3::types::error::{NoSuchKey, NotFound};
    use aws_smithy_mocks::{mock, mock_client};

    fn offline_client() -> Client {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        Client::from_conf(config)
    }

    #[test]
    fn test_full_key() {
        let plain = S3Backend::from_client("dev", offline_client(), "bucket", None).unwrap();
        assert_eq!(plain.full_key("/a/b.txt").unwrap(), "a/b.txt");
        let prefixed = S3Backend::from_client("dev", offline_client(), "bucket", Some("/site/".to_string())).unwrap();
        assert_eq!(prefixed.full_key("a/b.txt").unwrap(), "site/a/b.txt");
        assert!(prefixed.full_key("../escape").is_err());
        assert!(S3Backend::from_client("dev", offline_client(), "bucket", Some("..".to_string())).is_err());
    }

    #[tokio::test]
    async fn test_write_puts_prefixed_key() {
        let put = mock!(aws_sdk_s3::Client::put_object)
            .match_requests(|req| req.bucket() == Some("assets") && req.key() == Some("site/a/b.txt"))
            .then_output(|| PutObjectOutput::builder().build());
        let client = mock_client!(aws_sdk_s3, [&put]);
        let backend = S3Backend::from_client("dev", client, "assets", Some("site".to_string())).unwrap();
        backend.write("/a/b.txt", b"hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_body() {
        let get = mock!(aws_sdk_s3::Client::get_object)
            .then_output(|| GetObjectOutput::builder().body(ByteStream::from_static(b"hello")).build());
        let client = mock_client!(aws_sdk_s3, [&get]);
        let backend = S3Backend::from_client("dev", client, "assets", None).unwrap();
        assert_eq!(backend.read("a.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_read_missing_key() {
        let get = mock!(aws_sdk_s3::Client::get_object)
            .then_error(|| GetObjectError::NoSuchKey(NoSuchKey::builder().build()));
        let client = mock_client!(aws_sdk_s3, [&get]);
        let backend = S3Backend::from_client("dev", client, "assets", None).unwrap();
        let err = backend.read("missing.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(key) if key == "missing.txt"));
    }

    #[tokio::test]
    async fn test_exists() {
        let found = mock!(aws_sdk_s3::Client::head_object)
            .match_requests(|req| req.key() == Some("a.txt"))
            .then_output(|| HeadObjectOutput::builder().build());
        let missing = mock!(aws_sdk_s3::Client::head_object)
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let client = mock_client!(aws_sdk_s3, [&found, &missing]);
        let backend = S3Backend::from_client("dev", client, "assets", None).unwrap();
        assert!(backend.exists("a.txt").await.unwrap());
        assert!(!backend.exists("missing.txt").await.unwrap());
    }
}
