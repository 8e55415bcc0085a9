//! End-to-end orchestrator scenarios, run against an in-memory
//! `SqliteDatabase` and a `FileSource` over a temporary directory.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use migrate_engine::{Migrator, MigrateError};
use migrate_engine::database::sqlite::SqliteDatabase;
use migrate_engine::source::file::FileSource;
use rusqlite::Connection;

/// Scenario corpus: versions {1,3,4,5,7}, with 1/4/7 having both
/// directions, 3 up-only, 5 down-only.
fn write_corpus(dir: &Path) {
    let write = |name: &str, body: &str| {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    };
    write("1_init.up.sql", "CREATE TABLE t1 (id INTEGER);");
    write("1_init.down.sql", "DROP TABLE t1;");
    write("3_add_a.up.sql", "CREATE TABLE t3 (id INTEGER);");
    write("4_add_b.up.sql", "CREATE TABLE t4 (id INTEGER);");
    write("4_add_b.down.sql", "DROP TABLE t4;");
    write("5_remove_c.down.sql", "SELECT 1;");
    write("7_final.up.sql", "CREATE TABLE t7 (id INTEGER);");
    write("7_final.down.sql", "DROP TABLE t7;");
}

fn new_migrator(dir: &Path) -> Migrator<FileSource, SqliteDatabase> {
    let source = FileSource::from_directory(dir).unwrap();
    let database = SqliteDatabase::new(
        Connection::open_in_memory().unwrap(),
        "schema_migrations".to_string(),
        Duration::from_secs(1),
    )
    .unwrap();
    Migrator::new(source, database)
}

#[test]
fn scenario_a_migrate_from_nil_to_3() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let mut migrator = new_migrator(dir.path());

    migrator.migrate(3).unwrap();
    assert_eq!(migrator.version().unwrap(), (3, false));
}

#[test]
fn scenario_b_steps_then_more_steps() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let mut migrator = new_migrator(dir.path());

    migrator.steps(1).unwrap();
    assert_eq!(migrator.version().unwrap(), (1, false));

    migrator.steps(2).unwrap();
    assert_eq!(migrator.version().unwrap(), (4, false));
}

#[test]
fn scenario_c_down_from_top_reaches_nil() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let mut migrator = new_migrator(dir.path());

    migrator.up().unwrap();
    migrator.down().unwrap();

    let err = migrator.version().unwrap_err();
    assert!(matches!(err, MigrateError::NilVersion));
}

#[test]
fn scenario_d_migrate_to_unknown_version_not_found() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let mut migrator = new_migrator(dir.path());

    let err = migrator.migrate(2).unwrap_err();
    assert!(matches!(err, MigrateError::NotFound(2)));
}

#[test]
fn scenario_f_steps_exceeding_corpus_reports_short_limit() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let mut migrator = new_migrator(dir.path());

    let err = migrator.steps(10).unwrap_err();
    assert!(matches!(err, MigrateError::ShortLimit { short: 5 }));
    assert_eq!(migrator.version().unwrap(), (7, false));
}

#[test]
fn dirty_database_refuses_further_operations_until_forced() {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str| {
        let mut f = File::create(dir.path().join(name)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    };
    write("1_ok.up.sql", "CREATE TABLE ok (id INTEGER);");
    write("2_bad.up.sql", "NOT VALID SQL;;;");
    let mut migrator = new_migrator(dir.path());

    let err = migrator.migrate(2).unwrap_err();
    assert!(matches!(err, MigrateError::Database(_)));

    let err = migrator.up().unwrap_err();
    assert!(matches!(err, MigrateError::Dirty { version: 2 }));

    migrator.force(1).unwrap();
    assert_eq!(migrator.version().unwrap(), (1, false));
}

#[test]
fn drop_resets_to_nil_version() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let mut migrator = new_migrator(dir.path());

    migrator.up().unwrap();
    migrator.drop().unwrap();

    let err = migrator.version().unwrap_err();
    assert!(matches!(err, MigrateError::NilVersion));
}

#[test]
fn graceful_stop_requested_up_front_applies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let mut migrator = new_migrator(dir.path());
    migrator.graceful_stop();

    migrator.up().unwrap();
    let err = migrator.version().unwrap_err();
    assert!(matches!(err, MigrateError::NilVersion));
}
