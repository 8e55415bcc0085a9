use std::fmt;

/// A migration version. Non-negative for real migrations; `NIL_VERSION`
/// denotes "no migration applied".
pub type Version = i64;

/// "No migration applied" — the pristine state.
pub const NIL_VERSION: Version = -1;

/// The direction a migration script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// An ordered, immutable snapshot of the versions a source driver knows
/// about, plus which directions each one has a script for.
///
/// Source drivers build one of these on `open` and hand out `first`/`prev`/
/// `next` lookups against it; the planner never touches the underlying
/// corpus directly.
#[derive(Debug, Clone, Default)]
pub struct VersionIndex {
    versions: Vec<Version>,
    has_up: Vec<bool>,
    has_down: Vec<bool>,
}

impl VersionIndex {
    /// Build an index from `(version, has_up, has_down)` triples. Entries
    /// need not be sorted; duplicate versions are rejected.
    pub fn build(
        mut entries: Vec<(Version, bool, bool)>,
    ) -> std::result::Result<Self, Version> {
        entries.sort_by_key(|(v, _, _)| *v);
        for pair in entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(pair[0].0);
            }
        }
        let mut versions = Vec::with_capacity(entries.len());
        let mut has_up = Vec::with_capacity(entries.len());
        let mut has_down = Vec::with_capacity(entries.len());
        for (v, up, down) in entries {
            versions.push(v);
            has_up.push(up);
            has_down.push(down);
        }
        Ok(Self {
            versions,
            has_up,
            has_down,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Smallest known version.
    pub fn first(&self) -> Option<Version> {
        self.versions.first().copied()
    }

    /// Greatest known version strictly less than `v`.
    pub fn prev(&self, v: Version) -> Option<Version> {
        let idx = self.versions.partition_point(|&x| x < v);
        if idx == 0 {
            None
        } else {
            Some(self.versions[idx - 1])
        }
    }

    /// Smallest known version strictly greater than `v`.
    pub fn next(&self, v: Version) -> Option<Version> {
        let idx = self.versions.partition_point(|&x| x <= v);
        self.versions.get(idx).copied()
    }

    pub fn contains(&self, v: Version) -> bool {
        self.versions.binary_search(&v).is_ok()
    }

    pub fn has_up(&self, v: Version) -> bool {
        self.versions
            .binary_search(&v)
            .map(|i| self.has_up[i])
            .unwrap_or(false)
    }

    pub fn has_down(&self, v: Version) -> bool {
        self.versions
            .binary_search(&v)
            .map(|i| self.has_down[i])
            .unwrap_or(false)
    }
}
