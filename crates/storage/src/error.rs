//! Errors raised by storage backends.

use derive_more::{Display, Error};
use std::io::Error as IoError;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong, from the point of view of the caller deciding whether a
/// sync attempt should be reported as a failed upload or retried later.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Credentials or filesystem permissions.
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Request to a remote store failed after the SDK's own retries.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Key escapes the backend root, or the root itself is unusable.
    #[display("invalid key: {_0:?}")]
    InvalidKey(#[error(not(source))] String),
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::BackendError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::NotFound("a/b.txt".to_string()).to_string(), "object not found: a/b.txt");
        assert_eq!(ErrorKind::InvalidKey("../x".to_string()).to_string(), r#"invalid key: "../x""#);
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Network("timeout".to_string()).is_retryable());
        assert!(!ErrorKind::NotFound("a".to_string()).is_retryable());
        assert!(!ErrorKind::InvalidKey("a".to_string()).is_retryable());
    }
}
