use thiserror::Error;

use crate::version::Version;

/// Errors produced by source drivers.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("version {0} not found in source")]
    NotFound(Version),

    #[error("migration {0} exists but has no body for this direction")]
    Exists(Version),

    #[error("duplicate migration version {0}")]
    DuplicateVersion(Version),

    #[error("source corpus is empty")]
    Empty,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid migration file name: {0}")]
    InvalidFileName(String),
}

/// Errors produced by database drivers.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to run migration: {0}")]
    Run(String),

    #[error("timed out waiting for database lock")]
    LockTimeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Other(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::Other(e.to_string())
    }
}

/// Top-level error surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The requested operation would be a no-op.
    #[error("no change")]
    NoChange,

    /// `version()` was called on a pristine database.
    #[error("no migration has been applied yet")]
    NilVersion,

    /// `force` was called with a version below `NilVersion`.
    #[error("invalid version: must be >= -1")]
    InvalidVersion,

    /// The lock is already held by this engine instance.
    #[error("database locked by this instance")]
    Locked,

    /// Lock acquisition exceeded the configured timeout.
    #[error("timed out waiting for database lock")]
    LockTimeout,

    /// The database is dirty and refuses non-`force` operations.
    #[error("database is dirty at version {version}: fix and force a version")]
    Dirty { version: Version },

    /// A bounded `steps` could only apply fewer migrations than requested.
    #[error("could only apply {short} of the requested migrations")]
    ShortLimit { short: u64 },

    /// No matching version or direction was found in the source.
    #[error("not found: {0}")]
    NotFound(Version),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Several errors occurred, e.g. a run failure followed by an unlock
    /// failure. The first element is the primary cause.
    #[error("multiple errors: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Multi(Vec<MigrateError>),
}

impl MigrateError {
    /// Combine a primary result with a secondary error (e.g. an unlock
    /// failure observed while unwinding from an earlier error). If `primary`
    /// is `Ok`, the secondary error (if any) becomes the sole error.
    pub fn combine(primary: Result<()>, secondary: Option<MigrateError>) -> Result<()> {
        match (primary, secondary) {
            (Ok(()), None) => Ok(()),
            (Ok(()), Some(e)) => Err(e),
            (Err(e), None) => Err(e),
            (Err(a), Some(b)) => Err(MigrateError::Multi(vec![a, b])),
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
