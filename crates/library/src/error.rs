//! Library Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Store and storage failures are wrapped, not flattened,
//! so the originating frame is still visible when the error is reported.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The workspace, actor or task being asked about does not exist.
    #[display("not found")]
    NotFound,
    /// A read or write via [`wsync_store::Repository`] failed.
    #[display("record store error")]
    Cache,
    /// A staging backend operation failed.
    #[display("storage error")]
    Storage,
    #[display("invalid file path")]
    InvalidPath,
    /// A synchronization could not be started or one of its files could not
    /// be recorded.
    #[display("sync error")]
    Sync,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache | Self::Storage)
    }
}
