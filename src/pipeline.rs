//! The prefetch/streaming pipeline: a provider thread enumerates
//! migrations via the planner and hands them to a runner thread over a
//! bounded `crossbeam-channel`, while a per-migration buffering thread
//! drains each migration's body into its pipe concurrently with the
//! runner's execution of earlier migrations.
//!
//! Uses `crossbeam-channel` over a bounded channel plus plain
//! `std::thread::scope`, keeping the whole engine synchronous rather than
//! pulling in an async runtime.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info};

use crate::database::DatabaseDriver;
use crate::error::{MigrateError, Result};
use crate::migration::{self, Migration};
use crate::planner::{self, PlannedSteps};
use crate::source::SourceDriver;

/// Default channel capacity between provider and runner.
pub const DEFAULT_PREFETCH: usize = 10;

/// A one-shot, cooperative cancellation signal. Checked by the
/// provider between produced migrations and by the runner between
/// dequeues; never aborts a `run()` already in flight.
#[derive(Clone, Default)]
pub struct GracefulStop(Arc<AtomicBool>);

impl GracefulStop {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Start the buffering thread for a migration that has a body, wiring its
/// pipe reader into the `Migration` before it's sent to the runner. A
/// migration with no body needs no buffering thread at all.
fn start_buffering(migration: &mut Migration) {
    let Some(mut body) = migration.body.take() else {
        return;
    };
    let buffer_size = migration.buffer_size.max(1);
    let (mut writer, reader) = migration::pipe(buffer_size);
    migration.buffered_body = Some(reader);

    let timing = migration.timing.clone();
    timing.lock().unwrap().started_buffering = Some(Instant::now());

    thread::spawn(move || {
        let mut buf = vec![0u8; 64 * 1024];
        let mut bytes_read: u64 = 0;
        let mut stamped_first_read = false;
        loop {
            match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    bytes_read += n as u64;
                    if !stamped_first_read {
                        timing.lock().unwrap().finished_buffering = Some(Instant::now());
                        stamped_first_read = true;
                    }
                    if writer.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let mut t = timing.lock().unwrap();
        t.finished_reading = Some(Instant::now());
        t.bytes_read = bytes_read;
        // Dropping `writer` here closes the pipe and signals EOF to the
        // runner side; dropping `body` releases the source's handle.
    });
}

/// Runs the planner strategy, sending each resulting `Migration` on
/// `tx`. Stops early if `stop` is set. Returns the terminal planning error,
/// if any — `ErrNoChange` included, since the caller treats that as the
/// operation's own outcome rather than a pipeline failure. A short-limit
/// shortfall is surfaced only after every planned step has been sent, so
/// the migrations that could be found are still applied.
fn provide(
    source: &dyn SourceDriver,
    plan: Result<PlannedSteps>,
    tx: Sender<Migration>,
    stop: &GracefulStop,
) -> Result<()> {
    let PlannedSteps { steps, short } = plan?;
    for step in steps {
        if stop.is_set() {
            break;
        }
        let mut migration = planner::build_migration(source, step)?;
        start_buffering(&mut migration);
        if tx.send(migration).is_err() {
            // Runner side hung up; nothing more to do.
            break;
        }
    }
    if let Some(short) = short {
        return Err(MigrateError::ShortLimit { short });
    }
    Ok(())
}

/// Drains migrations from `rx`, applying each to `db`. Stops early if
/// `stop` is set between dequeues (never mid-`run`). Returns the first
/// error encountered, alongside the target version of the last migration
/// that was successfully applied or attempted.
fn consume(db: &mut dyn DatabaseDriver, rx: Receiver<Migration>, stop: &GracefulStop) -> Result<()> {
    loop {
        let mut migration = match rx.recv_timeout(std::time::Duration::from_millis(50)) {
            Ok(m) => m,
            Err(RecvTimeoutError::Timeout) => {
                if stop.is_set() {
                    return Ok(());
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };

        if stop.is_set() {
            return Ok(());
        }

        let started = Instant::now();
        db.set_version(migration.target_version, true)?;

        if let Some(ref mut reader) = migration.buffered_body {
            db.run(reader)?;
        }

        db.set_version(migration.target_version, false)?;

        let elapsed = started.elapsed();
        if migration.is_empty() {
            debug!(
                version = migration.version,
                target = migration.target_version,
                "applied empty migration step in {:?}",
                elapsed
            );
        } else {
            info!(
                identifier = %migration.identifier,
                version = migration.version,
                target = migration.target_version,
                "ran migration in {:?}",
                elapsed
            );
        }
    }
}

fn join_pipeline_threads(
    provider_result: std::thread::Result<Result<()>>,
    runner_result: std::thread::Result<Result<()>>,
) -> Result<()> {
    let panicked = |what: &str| {
        MigrateError::Database(crate::error::DatabaseError::Other(format!(
            "{what} thread panicked"
        )))
    };
    let provider_result = provider_result.unwrap_or_else(|_| Err(panicked("provider")));
    let runner_result = runner_result.unwrap_or_else(|_| Err(panicked("runner")));
    MigrateError::combine(runner_result, provider_result.err())
}

/// Wire a provider thread and a runner thread together and drive `steps`
/// through `db`. Returns once both threads finish; the first error seen
/// (provider's or runner's) wins, matching the "close channel, then wait
/// for provider's terminal error" ordering.
pub fn run(
    source: &dyn SourceDriver,
    db: &mut dyn DatabaseDriver,
    plan: Result<PlannedSteps>,
    prefetch: usize,
    stop: &GracefulStop,
) -> Result<()> {
    let (tx, rx) = bounded::<Migration>(prefetch.max(1));

    thread::scope(|scope| {
        let provider_stop = stop.clone();
        let provider_handle = scope.spawn(move || provide(source, plan, tx, &provider_stop));
        let runner_handle = scope.spawn(move || consume(db, rx, stop));
        join_pipeline_threads(provider_handle.join(), runner_handle.join())
    })
}

/// The `Migrator::run` variant: the caller already built the
/// `Migration` sequence (no planner involved), so the provider side just
/// starts each one buffering and forwards it to the runner in order.
pub fn run_supplied(
    db: &mut dyn DatabaseDriver,
    migrations: Vec<Migration>,
    prefetch: usize,
    stop: &GracefulStop,
) -> Result<()> {
    let (tx, rx) = bounded::<Migration>(prefetch.max(1));

    thread::scope(|scope| {
        let provider_stop = stop.clone();
        let provider_handle = scope.spawn(move || {
            for mut migration in migrations {
                if provider_stop.is_set() {
                    break;
                }
                start_buffering(&mut migration);
                if tx.send(migration).is_err() {
                    break;
                }
            }
            Ok(())
        });
        let runner_handle = scope.spawn(move || consume(db, rx, stop));
        join_pipeline_threads(provider_handle.join(), runner_handle.join())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::SqliteDatabase;
    use crate::error::DatabaseError;
    use crate::source::file::FileSource;
    use crate::version::NIL_VERSION;
    use rusqlite::Connection;
    use std::fs::File;
    use std::io::Write as _;
    use std::time::Duration;

    fn write(dir: &std::path::Path, name: &str, body: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn runs_a_small_up_sequence_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_a.up.sql", "CREATE TABLE a (id INTEGER);");
        write(dir.path(), "2_b.up.sql", "CREATE TABLE b (id INTEGER);");
        let source = FileSource::from_directory(dir.path()).unwrap();

        let mut db = SqliteDatabase::new(
            Connection::open_in_memory().unwrap(),
            "schema_migrations".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();

        let steps = planner::read(&source, NIL_VERSION, 2).map(PlannedSteps::complete);
        let stop = GracefulStop::new();
        run(&source, &mut db, steps, DEFAULT_PREFETCH, &stop).unwrap();

        let state = db.version().unwrap();
        assert_eq!(state.version, 2);
        assert!(!state.dirty);
    }

    #[test]
    fn failing_run_leaves_dirty_marker() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_a.up.sql", "CREATE TABLE a (id INTEGER);");
        write(dir.path(), "2_bad.up.sql", "THIS IS NOT VALID SQL;;;");
        let source = FileSource::from_directory(dir.path()).unwrap();

        let mut db = SqliteDatabase::new(
            Connection::open_in_memory().unwrap(),
            "schema_migrations".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();

        let steps = planner::read(&source, NIL_VERSION, 2).map(PlannedSteps::complete);
        let stop = GracefulStop::new();
        let err = run(&source, &mut db, steps, DEFAULT_PREFETCH, &stop).unwrap_err();
        assert!(matches!(err, MigrateError::Database(DatabaseError::Run(_))));

        let state = db.version().unwrap();
        assert_eq!(state.version, 2);
        assert!(state.dirty);
    }
}
