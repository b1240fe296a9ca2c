//! The error taxonomy of §7, surfaced uniformly across every component.
//!
//! Library crates return `Result<T, CoreError>`. Only broken invariants
//! (a repository backend accepting a transition the central check already
//! rejected) are programmer bugs and panic instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file access error: {0}")]
    FileAccess(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("archive corrupt: {0}")]
    ArchiveCorrupt(String),

    #[error("archive limit exceeded: {0}")]
    ArchiveLimit(String),

    #[error("analyzer error: {0}")]
    Analyzer(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("invalid SQL file skipped: {0}")]
    InvalidSqlSkip(String),

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("config error: {0}")]
    Config(String),
}

impl CoreError {
    /// Stable taxonomy label, used both in log fields and in event payload
    /// `error.kind` (§4.2).
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::FileNotFound(_) => "FILE_NOT_FOUND",
            CoreError::FileAccess(_) => "FILE_ACCESS",
            CoreError::Encoding(_) => "ENCODING",
            CoreError::ArchiveCorrupt(_) => "ARCHIVE_CORRUPT",
            CoreError::ArchiveLimit(_) => "ARCHIVE_LIMIT",
            CoreError::Analyzer(_) => "ANALYZER",
            CoreError::Timeout(_) => "TIMEOUT",
            CoreError::Bus(_) => "BUS",
            CoreError::Lock(_) => "LOCK",
            CoreError::Repository(_) => "REPOSITORY",
            CoreError::InvalidSqlSkip(_) => "INVALID_SQL_SKIP",
            CoreError::InvalidTransition(_) => "CONFLICT",
            CoreError::Config(_) => "VALIDATION",
        }
    }

    /// Whether the worker's retry policy (§4.10) should attempt this error
    /// again. `InvalidSqlSkip` is explicitly excluded per §7.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CoreError::Analyzer(_) | CoreError::Bus(_) | CoreError::Lock(_) | CoreError::Repository(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sql_skip_is_not_retriable() {
        assert!(!CoreError::InvalidSqlSkip("x".into()).is_retriable());
    }

    #[test]
    fn analyzer_errors_are_retriable() {
        assert!(CoreError::Analyzer("boom".into()).is_retriable());
    }
}
