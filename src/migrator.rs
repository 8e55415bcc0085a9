//! The public orchestrator: couples locking, dirty-state checks, the
//! planner, and the prefetch pipeline behind one small surface
//! (`migrate`/`steps`/`up`/`down`/`force`/`version`/`drop`/`run`/`close`),
//! generalized from "one SQL transaction per call" to the full
//! lock/dirty/plan/pipeline template every mutating operation shares.

use std::time::Duration;

use tracing::{info, warn};

use crate::database::DatabaseDriver;
use crate::error::{DatabaseError, MigrateError, Result};
use crate::migration::Migration;
use crate::pipeline::{self, GracefulStop, DEFAULT_PREFETCH};
use crate::planner;
use crate::source::SourceDriver;
use crate::version::NIL_VERSION;

/// Default bound on how long a `lock()` call may block. Enforced by
/// the `DatabaseDriver` implementation itself (e.g. `SqliteDatabase` is
/// constructed with its own timeout); kept here only as the value CLI
/// wiring falls back to when `--lock-timeout` isn't given.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

/// The migration engine: one `SourceDriver`, one `DatabaseDriver`, and the
/// knobs that control the pipeline between them.
pub struct Migrator<S: SourceDriver, D: DatabaseDriver> {
    source: S,
    database: D,
    prefetch: usize,
    stop: GracefulStop,
}

impl<S: SourceDriver, D: DatabaseDriver> Migrator<S, D> {
    pub fn new(source: S, database: D) -> Self {
        Self {
            source,
            database,
            prefetch: DEFAULT_PREFETCH,
            stop: GracefulStop::new(),
        }
    }

    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    /// A clone-able handle callers can use to request a graceful stop from
    /// another thread (e.g. a SIGINT handler).
    pub fn graceful_stop_handle(&self) -> GracefulStop {
        self.stop.clone()
    }

    /// Acquire the lock, polling until `lock_timeout` elapses.
    fn acquire_lock(&mut self) -> Result<()> {
        match self.database.lock() {
            Ok(true) => Ok(()),
            Ok(false) => Err(MigrateError::Locked),
            Err(DatabaseError::LockTimeout) => Err(MigrateError::LockTimeout),
            Err(e) => Err(MigrateError::Database(e)),
        }
    }

    fn release_lock(&mut self) -> Option<MigrateError> {
        self.database.unlock().err().map(MigrateError::Database)
    }

    fn current_version(&self) -> Result<(i64, bool)> {
        let state = self.database.version().map_err(MigrateError::Database)?;
        Ok((state.version, state.dirty))
    }

    /// The shared template every mutating operation follows: lock,
    /// check dirty, run `body`, unlock — combining any unlock error with
    /// whatever `body` produced.
    fn with_lock<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self, i64) -> Result<()>,
    {
        self.acquire_lock()?;
        let result = (|| {
            let (version, dirty) = self.current_version()?;
            if dirty {
                return Err(MigrateError::Dirty { version });
            }
            body(self, version)
        })();
        let unlock_err = self.release_lock();
        let combined = MigrateError::combine(result, unlock_err);
        match &combined {
            Ok(()) => info!("migration operation complete"),
            Err(MigrateError::NoChange) => info!("migration operation is a no-op"),
            Err(e) => warn!(error = %e, "migration operation failed"),
        }
        combined
    }

    fn run_pipeline(&mut self, plan: Result<planner::PlannedSteps>) -> Result<()> {
        pipeline::run(
            &self.source,
            &mut self.database,
            plan,
            self.prefetch,
            &self.stop,
        )
    }

    /// Go to an absolute version.
    pub fn migrate(&mut self, version: i64) -> Result<()> {
        self.with_lock(|this, current| {
            let plan = planner::read(&this.source, current, version).map(planner::PlannedSteps::complete);
            this.run_pipeline(plan)
        })
    }

    /// Apply `n` steps: forward if positive, backward if negative
    ///.
    pub fn steps(&mut self, n: i64) -> Result<()> {
        self.with_lock(|this, current| {
            let plan = match n.cmp(&0) {
                std::cmp::Ordering::Equal => Err(MigrateError::NoChange),
                std::cmp::Ordering::Greater => planner::read_up(&this.source, current, n),
                std::cmp::Ordering::Less => planner::read_down(&this.source, current, -n),
            };
            this.run_pipeline(plan)
        })
    }

    /// Apply every remaining up migration.
    pub fn up(&mut self) -> Result<()> {
        self.with_lock(|this, current| {
            let plan = planner::read_up(&this.source, current, -1);
            this.run_pipeline(plan)
        })
    }

    /// Undo every applied migration.
    pub fn down(&mut self) -> Result<()> {
        self.with_lock(|this, current| {
            let plan = planner::read_down(&this.source, current, -1);
            this.run_pipeline(plan)
        })
    }

    /// Feed a caller-supplied, already-built sequence of migrations straight
    /// into the pipeline, still under lock and dirty check.
    pub fn run(&mut self, migrations: Vec<Migration>) -> Result<()> {
        self.with_lock(move |this, _current| {
            pipeline::run_supplied(&mut this.database, migrations, this.prefetch, &this.stop)
        })
    }

    /// Erase all user data. No planning; still under lock.
    pub fn drop(&mut self) -> Result<()> {
        self.acquire_lock()?;
        let result = self.database.drop().map_err(MigrateError::Database);
        let unlock_err = self.release_lock();
        MigrateError::combine(result, unlock_err)
    }

    /// Set the persistent version directly and clear the dirty flag,
    /// without executing any script.
    pub fn force(&mut self, version: i64) -> Result<()> {
        if version < NIL_VERSION {
            return Err(MigrateError::InvalidVersion);
        }
        self.acquire_lock()?;
        let result = self
            .database
            .set_version(version, false)
            .map_err(MigrateError::Database);
        let unlock_err = self.release_lock();
        MigrateError::combine(result, unlock_err)
    }

    /// Read the persistent version state without taking the lock.
    pub fn version(&self) -> Result<(i64, bool)> {
        let (version, dirty) = self.current_version()?;
        if version == NIL_VERSION {
            return Err(MigrateError::NilVersion);
        }
        Ok((version, dirty))
    }

    /// Request cooperative cancellation; observed by the provider and
    /// runner threads at their next checkpoint.
    pub fn graceful_stop(&self) {
        self.stop.trigger();
    }

    /// Close both the source and the database, combining any errors from
    /// each.
    pub fn close(mut self) -> Result<()> {
        let source_err = self.source.close().err().map(MigrateError::Source);
        let db_err = self.database.close().err().map(MigrateError::Database);
        match (source_err, db_err) {
            (None, None) => Ok(()),
            (Some(a), None) => Err(a),
            (None, Some(b)) => Err(b),
            (Some(a), Some(b)) => Err(MigrateError::Multi(vec![a, b])),
        }
    }
}

