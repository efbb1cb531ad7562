//! Error types for the [`sync`](super) module.
//!
//! Upload failures are not errors: they become failed per-file records. What
//! remains is the inability to start a sync at all, and the inability to
//! record an outcome.

use derive_more::{Display, Error};

/// A sync error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The workspace or the acting user does not exist.
    #[display("workspace or actor not found")]
    NotFound,
    /// The task or one of its per-file records could not be persisted.
    #[display("could not persist sync outcome")]
    Cache,
}
