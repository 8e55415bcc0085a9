//! A `DatabaseDriver` over `rusqlite`, running each migration script inside
//! one transaction via `execute_batch`. Version tracking uses an explicit
//! `schema_migrations` table rather than `PRAGMA user_version`, so it can
//! also carry a `dirty` flag, plus a `schema_lock` table standing in for the
//! advisory lock a networked database would offer natively.

use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::database::{DatabaseDriver, DatabaseVersionState};
use crate::error::DatabaseError;
use crate::url::filter_custom_query_params;
use crate::version::NIL_VERSION;

const DEFAULT_TABLE: &str = "schema_migrations";
const LOCK_TABLE: &str = "schema_lock";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct SqliteDatabase {
    conn: Connection,
    table: String,
    lock_timeout: Duration,
    locked: bool,
}

impl SqliteDatabase {
    pub fn new(conn: Connection, table: String, lock_timeout: Duration) -> Result<Self, DatabaseError> {
        let db = Self {
            conn,
            table,
            lock_timeout,
            locked: false,
        };
        db.ensure_tables()?;
        Ok(db)
    }

    fn ensure_tables(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (version INTEGER NOT NULL, dirty INTEGER NOT NULL);
             CREATE TABLE IF NOT EXISTS {lock_table} (locked INTEGER NOT NULL);",
            table = self.table,
            lock_table = LOCK_TABLE,
        ))?;
        let row_count: i64 = self.conn.query_row(
            &format!("SELECT count(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        if row_count == 0 {
            self.conn.execute(
                &format!("INSERT INTO {} (version, dirty) VALUES (?1, 0)", self.table),
                [NIL_VERSION],
            )?;
        }
        let lock_rows: i64 = self
            .conn
            .query_row(&format!("SELECT count(*) FROM {LOCK_TABLE}"), [], |row| {
                row.get(0)
            })?;
        if lock_rows == 0 {
            self.conn
                .execute(&format!("INSERT INTO {LOCK_TABLE} (locked) VALUES (0)"), [])?;
        }
        Ok(())
    }

    fn try_acquire(&self) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            &format!("UPDATE {LOCK_TABLE} SET locked = 1 WHERE locked = 0"),
            [],
        )?;
        Ok(changed == 1)
    }
}

impl DatabaseDriver for SqliteDatabase {
    fn open(url: &str) -> Result<Self, DatabaseError> {
        let (path, query) = filter_custom_query_params(url);
        let path = path.strip_prefix("sqlite://").unwrap_or(&path);
        let conn = if path.is_empty() || path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(DatabaseError::from)?;

        let table = query
            .get("x-migrations-table")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TABLE.to_string());

        Self::new(conn, table, Duration::from_secs(15))
    }

    fn close(&mut self) -> Result<(), DatabaseError> {
        Ok(())
    }

    fn lock(&mut self) -> Result<bool, DatabaseError> {
        if self.locked {
            return Ok(false);
        }
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            if self.try_acquire()? {
                self.locked = true;
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Err(DatabaseError::LockTimeout);
            }
            thread::sleep(LOCK_POLL_INTERVAL);
        }
    }

    fn unlock(&mut self) -> Result<(), DatabaseError> {
        if !self.locked {
            return Ok(());
        }
        self.conn
            .execute(&format!("UPDATE {LOCK_TABLE} SET locked = 0"), [])?;
        self.locked = false;
        Ok(())
    }

    fn run(&mut self, reader: &mut dyn Read) -> Result<(), DatabaseError> {
        let mut script = String::new();
        reader
            .read_to_string(&mut script)
            .map_err(DatabaseError::Io)?;
        let tx = self.conn.transaction()?;
        tx.execute_batch(&script)
            .map_err(|e| DatabaseError::Run(e.to_string()))?;
        tx.commit()?;
        Ok(())
    }

    fn set_version(&mut self, version: i64, dirty: bool) -> Result<(), DatabaseError> {
        self.conn.execute(
            &format!("UPDATE {} SET version = ?1, dirty = ?2", self.table),
            (version, dirty as i64),
        )?;
        Ok(())
    }

    fn version(&self) -> Result<DatabaseVersionState, DatabaseError> {
        let (version, dirty): (i64, i64) = self.conn.query_row(
            &format!("SELECT version, dirty FROM {} LIMIT 1", self.table),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(DatabaseVersionState {
            version,
            dirty: dirty != 0,
        })
    }

    fn drop(&mut self) -> Result<(), DatabaseError> {
        let tables: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        };
        for name in tables {
            self.conn
                .execute(&format!("DROP TABLE IF EXISTS \"{name}\""), [])?;
        }
        self.ensure_tables()?;
        self.conn
            .execute(&format!("UPDATE {} SET version = ?1, dirty = 0", self.table), [NIL_VERSION])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn open_memory() -> SqliteDatabase {
        SqliteDatabase::new(
            Connection::open_in_memory().unwrap(),
            DEFAULT_TABLE.to_string(),
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn starts_pristine() {
        let db = open_memory();
        let state = db.version().unwrap();
        assert_eq!(state.version, NIL_VERSION);
        assert!(!state.dirty);
    }

    #[test]
    fn run_executes_script_in_transaction() {
        let mut db = open_memory();
        let mut script = Cursor::new(b"CREATE TABLE widgets (id INTEGER);".to_vec());
        db.run(&mut script).unwrap();
        let count: i64 = db
            .conn
            .query_row("SELECT count(*) FROM widgets", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn set_version_persists_dirty_flag() {
        let mut db = open_memory();
        db.set_version(5, true).unwrap();
        let state = db.version().unwrap();
        assert_eq!(state.version, 5);
        assert!(state.dirty);
    }

    #[test]
    fn lock_rejects_second_acquire_from_same_instance() {
        let mut db = open_memory();
        assert!(db.lock().unwrap());
        assert!(!db.lock().unwrap());
        db.unlock().unwrap();
    }

    #[test]
    fn drop_clears_tables_and_resets_version() {
        let mut db = open_memory();
        let mut script = Cursor::new(b"CREATE TABLE widgets (id INTEGER);".to_vec());
        db.run(&mut script).unwrap();
        db.set_version(3, false).unwrap();
        db.drop().unwrap();
        let state = db.version().unwrap();
        assert_eq!(state.version, NIL_VERSION);
        assert!(!state.dirty);
    }
}
