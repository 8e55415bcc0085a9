//! The `DatabaseDriver` contract: a target database plus whatever
//! persistent bookkeeping it uses to remember `(version, dirty)` and
//! to serialize migrators against each other.

use std::io::Read;

use crate::error::DatabaseError;
use crate::version::Version;

pub mod sqlite;

/// The persistent `(version, dirty)` pair a database driver stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseVersionState {
    pub version: Version,
    pub dirty: bool,
}

/// A target database and the bookkeeping table/object it uses to track
/// applied migrations.
///
/// The lock is advisory: it protects against two *migrators* sharing the
/// database but cannot prevent an unrelated schema-changing client from
/// interfering.
///
/// By protocol, `run`/`set_version` are only ever called by the pipeline's
/// runner thread, and only while the engine holds the lock; a driver need
/// not be `Sync`, only `Send`.
pub trait DatabaseDriver: Send {
    /// Open the database addressed by `url`, ensuring the version
    /// bookkeeping table exists. Called exactly once per instance.
    fn open(url: &str) -> Result<Self, DatabaseError>
    where
        Self: Sized;

    /// Release all resources held by this driver.
    fn close(&mut self) -> Result<(), DatabaseError>;

    /// Acquire the migration lock, blocking until available. Returns
    /// `Ok(false)` if the lock is already held by this instance (the
    /// caller surfaces this as `MigrateError::Locked`); `Ok(true)` on
    /// success.
    fn lock(&mut self) -> Result<bool, DatabaseError>;

    /// Release the lock.
    fn unlock(&mut self) -> Result<(), DatabaseError>;

    /// Execute the script contained in `reader` against the database. The
    /// driver decides transactional semantics; the engine does not attempt
    /// recovery from a failure here.
    fn run(&mut self, reader: &mut dyn Read) -> Result<(), DatabaseError>;

    /// Replace the persistent version state.
    fn set_version(&mut self, version: Version, dirty: bool) -> Result<(), DatabaseError>;

    /// Read the current persistent version state. An uninitialized database
    /// reports `(NIL_VERSION, false)`.
    fn version(&self) -> Result<DatabaseVersionState, DatabaseError>;

    /// Erase all user data. The driver may also re-create its version
    /// bookkeeping.
    fn drop(&mut self) -> Result<(), DatabaseError>;
}
