//! Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking. The kinds
//! describe what a caller can act upon: a missing entity, a name clash, or a
//! database that misbehaved underneath us.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A value could not be converted to or from its database representation.
    #[display("invalid store data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    #[display("workspace not found: {_0}")]
    WorkspaceNotFound(#[error(not(source))] i64),
    #[display("user not found: {_0}")]
    UserNotFound(#[error(not(source))] i64),
    #[display("record not found: ({_0}, {_1:?})")]
    RecordNotFound(#[error(not(source))] i64, String),
    #[display("sync task not found: {_0}")]
    TaskNotFound(#[error(not(source))] i64),
    /// A uniqueness constraint rejected the write (duplicate name, etc).
    #[display("conflict: {_0}")]
    Conflict(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if the caller asked for something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::WorkspaceNotFound(_) | Self::UserNotFound(_) | Self::RecordNotFound(..) | Self::TaskNotFound(_)
        )
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::WorkspaceNotFound(3), true)]
    #[case(ErrorKind::TaskNotFound(9), true)]
    #[case(ErrorKind::RecordNotFound(1, "a/b.txt".to_string()), true)]
    #[case(ErrorKind::Conflict("workspace name".to_string()), false)]
    #[case(ErrorKind::Database, false)]
    fn test_not_found_classification(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_not_found(), expected);
    }

    #[test]
    fn test_display() {
        let kind = ErrorKind::RecordNotFound(1, "a/b.txt".to_string());
        assert_eq!(kind.to_string(), r#"record not found: (1, "a/b.txt")"#);
    }
}
