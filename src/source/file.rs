//! A `SourceDriver` over a directory of `{version}_{name}.{up|down}.sql`
//! files. One directory scan builds a `VersionIndex` plus a map from
//! `(version, Direction)` to a file path.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::SourceError;
use crate::source::{ReadOutcome, SourceDriver};
use crate::version::{Direction, Version, VersionIndex};

pub struct FileSource {
    root: PathBuf,
    index: VersionIndex,
    paths: HashMap<(Version, Direction), PathBuf>,
    identifiers: HashMap<(Version, Direction), String>,
}

/// `{version}_{name}.{up|down}.{ext}` — parsed from a single file name. The
/// source doesn't interpret `name`/`ext` beyond carrying them through as the
/// migration's identifier.
fn parse_file_name(file_name: &str) -> Option<(Version, Direction, String)> {
    let (version_part, rest) = file_name.split_once('_')?;
    let version: Version = version_part.parse().ok()?;
    if version < 0 {
        return None;
    }
    let mut parts = rest.rsplitn(3, '.');
    let _ext = parts.next()?;
    let direction_part = parts.next()?;
    let direction = match direction_part {
        "up" => Direction::Up,
        "down" => Direction::Down,
        _ => return None,
    };
    let stem = parts.next().unwrap_or(rest);
    Some((version, direction, format!("{version_part}_{stem}")))
}

impl FileSource {
    /// Build a source over `dir`, scanning it once. The corpus may be
    /// empty; it may be sparse (not every version needs both directions).
    pub fn from_directory(dir: &Path) -> Result<Self, SourceError> {
        let mut paths = HashMap::new();
        let mut identifiers = HashMap::new();
        let mut seen: HashMap<Version, (bool, bool)> = HashMap::new();

        let entries = fs::read_dir(dir)?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some((version, direction, identifier)) = parse_file_name(name) else {
                continue;
            };

            let slot = seen.entry(version).or_insert((false, false));
            match direction {
                Direction::Up => slot.0 = true,
                Direction::Down => slot.1 = true,
            }
            paths.insert((version, direction), entry.path());
            identifiers.insert((version, direction), identifier);
        }

        let entries: Vec<(Version, bool, bool)> = seen
            .into_iter()
            .map(|(v, (up, down))| (v, up, down))
            .collect();
        let index = VersionIndex::build(entries).map_err(SourceError::DuplicateVersion)?;

        Ok(Self {
            root: dir.to_path_buf(),
            index,
            paths,
            identifiers,
        })
    }

    fn read(&self, v: Version, direction: Direction) -> Result<ReadOutcome, SourceError> {
        let has = match direction {
            Direction::Up => self.index.has_up(v),
            Direction::Down => self.index.has_down(v),
        };
        if !has {
            return Ok(if self.index.contains(v) {
                ReadOutcome::Exists
            } else {
                ReadOutcome::NotFound
            });
        }
        let path = self
            .paths
            .get(&(v, direction))
            .expect("index and paths must agree");
        let file = File::open(path)?;
        let identifier = self
            .identifiers
            .get(&(v, direction))
            .cloned()
            .unwrap_or_default();
        Ok(ReadOutcome::Found((Box::new(file), identifier)))
    }
}

impl SourceDriver for FileSource {
    fn open(url: &str) -> Result<Self, SourceError> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        Self::from_directory(Path::new(path))
    }

    fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn first(&self) -> Result<Option<Version>, SourceError> {
        Ok(self.index.first())
    }

    fn prev(&self, v: Version) -> Result<Option<Version>, SourceError> {
        Ok(self.index.prev(v))
    }

    fn next(&self, v: Version) -> Result<Option<Version>, SourceError> {
        Ok(self.index.next(v))
    }

    fn read_up(&self, v: Version) -> Result<ReadOutcome, SourceError> {
        self.read(v, Direction::Up)
    }

    fn read_down(&self, v: Version) -> Result<ReadOutcome, SourceError> {
        self.read(v, Direction::Down)
    }
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("root", &self.root)
            .field("versions", &self.index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, body: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn parses_version_direction_and_identifier() {
        let parsed = parse_file_name("0003_add_users.up.sql").unwrap();
        assert_eq!(parsed.0, 3);
        assert_eq!(parsed.1, Direction::Up);
        assert_eq!(parsed.2, "0003_add_users");
    }

    #[test]
    fn scans_sparse_corpus() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_init.up.sql", "create table t (id int);");
        write(dir.path(), "1_init.down.sql", "drop table t;");
        write(dir.path(), "3_add_col.up.sql", "alter table t add c int;");

        let src = FileSource::from_directory(dir.path()).unwrap();
        assert_eq!(src.first().unwrap(), Some(1));
        assert_eq!(src.next(1).unwrap(), Some(3));
        assert_eq!(src.next(3).unwrap(), None);

        match src.read_up(3).unwrap() {
            ReadOutcome::Found(_) => {}
            _ => panic!("expected a body for version 3 up"),
        }
        match src.read_down(3).unwrap() {
            ReadOutcome::Exists => {}
            _ => panic!("expected Exists sentinel for version 3 down"),
        }
    }

    #[test]
    fn unknown_version_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_init.up.sql", "select 1;");
        let src = FileSource::from_directory(dir.path()).unwrap();
        match src.read_up(9).unwrap() {
            ReadOutcome::NotFound => {}
            _ => panic!("expected NotFound for unknown version"),
        }
    }
}
