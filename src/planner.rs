//! Translates a user intent — go to version V, N steps, all up, all down —
//! plus a starting database version into an ordered sequence of
//! `(source_version, target_version)` steps. The planner never reads
//! a script body itself; `build_migration` is the one place that
//! turns a step into a `Migration` by delegating to the source.
//!
//! Keeps the up/down version-interval walk entirely separate from
//! execution, so the pipeline can stream and prefetch migration bodies
//! instead of running each one inside the same call that planned it.

use crate::error::{MigrateError, Result};
use crate::migration::Migration;
use crate::source::{ReadOutcome, SourceDriver};
use crate::version::{Direction, Version, NIL_VERSION};

/// A single planned step: move the database from `source` to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub source: Version,
    pub target: Version,
}

impl Step {
    fn direction(&self) -> Direction {
        if self.target >= self.source {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

/// The result of a relative (`read_up`/`read_down`) plan: the steps to run,
/// plus a short-limit shortfall to surface only after they've all run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSteps {
    pub steps: Vec<Step>,
    pub short: Option<u64>,
}

impl PlannedSteps {
    /// Wrap a fully-satisfied plan (no shortfall), e.g. from absolute `read`.
    pub fn complete(steps: Vec<Step>) -> Self {
        Self { steps, short: None }
    }
}

fn version_exists(source: &dyn SourceDriver, v: Version) -> Result<bool> {
    if v == NIL_VERSION {
        return Ok(true);
    }
    // A version "exists" if it's reachable from the index at all: cheapest
    // check is asking the index boundaries, but the trait doesn't expose a
    // direct membership query, so walk from `first()` is avoided in favor
    // of checking prev/next/first/self agreement: if v == first(), or
    // prev(next(v)) == v, it's present. FileSource additionally implements
    // the stronger invariant that first/prev/next are all backed by the
    // same VersionIndex, so this is exact, not approximate.
    if source.first()? == Some(v) {
        return Ok(true);
    }
    if let Some(p) = source.prev(v)? {
        if source.next(p)? == Some(v) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Absolute navigation from `from` to `to`.
pub fn read(source: &dyn SourceDriver, from: Version, to: Version) -> Result<Vec<Step>> {
    if from >= 0 && !version_exists(source, from)? {
        return Err(MigrateError::NotFound(from));
    }
    if to >= 0 && !version_exists(source, to)? {
        return Err(MigrateError::NotFound(to));
    }
    if from == to {
        return Err(MigrateError::NoChange);
    }

    let mut steps = Vec::new();
    if from < to {
        let mut current = from;
        if current == NIL_VERSION {
            let first = source.first()?.ok_or(MigrateError::NotFound(to))?;
            steps.push(Step {
                source: first,
                target: first,
            });
            current = first;
        }
        while current != to {
            let next = source
                .next(current)?
                .ok_or(MigrateError::NotFound(to))?;
            steps.push(Step {
                source: next,
                target: next,
            });
            current = next;
        }
    } else {
        let mut current = from;
        loop {
            if current == to {
                break;
            }
            match source.prev(current)? {
                Some(prev) => {
                    steps.push(Step {
                        source: current,
                        target: prev,
                    });
                    current = prev;
                }
                None => {
                    if to == NIL_VERSION {
                        steps.push(Step {
                            source: current,
                            target: NIL_VERSION,
                        });
                    }
                    break;
                }
            }
        }
    }
    Ok(steps)
}

/// Relative forward navigation. A shortfall (fewer than `limit` migrations
/// available) is reported as a trailing `short` count alongside the steps
/// that could be planned, rather than discarding them.
pub fn read_up(source: &dyn SourceDriver, from: Version, limit: i64) -> Result<PlannedSteps> {
    if limit == 0 {
        return Err(MigrateError::NoChange);
    }

    let mut steps = Vec::new();
    let mut current = from;
    if current == NIL_VERSION {
        if let Some(first) = source.first()? {
            steps.push(Step {
                source: first,
                target: first,
            });
            current = first;
        }
    }

    while limit == -1 || (steps.len() as i64) < limit {
        match source.next(current)? {
            Some(next) => {
                steps.push(Step {
                    source: next,
                    target: next,
                });
                current = next;
            }
            None => break,
        }
    }

    if limit == -1 {
        if steps.is_empty() {
            return Err(MigrateError::NoChange);
        }
        return Ok(PlannedSteps::complete(steps));
    }

    if steps.is_empty() {
        return Err(MigrateError::NotFound(from));
    }
    if (steps.len() as i64) < limit {
        let short = (limit - steps.len() as i64) as u64;
        return Ok(PlannedSteps {
            steps,
            short: Some(short),
        });
    }
    Ok(PlannedSteps::complete(steps))
}

/// Relative backward navigation, with the same shortfall handling as
/// `read_up`.
pub fn read_down(source: &dyn SourceDriver, from: Version, limit: i64) -> Result<PlannedSteps> {
    if limit == 0 {
        return Err(MigrateError::NoChange);
    }
    if from == NIL_VERSION {
        return if limit == -1 {
            Err(MigrateError::NoChange)
        } else {
            Err(MigrateError::NotFound(from))
        };
    }

    let mut steps = Vec::new();
    let mut current = from;
    loop {
        if limit > 0 && (steps.len() as i64) >= limit {
            break;
        }
        match source.prev(current)? {
            Some(prev) => {
                steps.push(Step {
                    source: current,
                    target: prev,
                });
                current = prev;
            }
            None => {
                let more_remaining = limit == -1 || (limit - steps.len() as i64) > 0;
                if more_remaining {
                    steps.push(Step {
                        source: current,
                        target: NIL_VERSION,
                    });
                }
                if limit > 0 && (steps.len() as i64) < limit {
                    let short = (limit - steps.len() as i64) as u64;
                    return Ok(PlannedSteps {
                        steps,
                        short: Some(short),
                    });
                }
                return Ok(PlannedSteps::complete(steps));
            }
        }
    }
    Ok(PlannedSteps::complete(steps))
}

/// Build the `Migration` record for a planned step.
pub fn build_migration(source: &dyn SourceDriver, step: Step) -> Result<Migration> {
    let direction = step.direction();
    let outcome = match direction {
        Direction::Up => source.read_up(step.source)?,
        Direction::Down => source.read_down(step.source)?,
    };
    Ok(match outcome {
        ReadOutcome::Found((body, identifier)) => {
            Migration::with_body(identifier, step.source, step.target, direction, body)
        }
        ReadOutcome::Exists | ReadOutcome::NotFound => {
            Migration::empty(step.source, step.target, direction)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::file::FileSource;
    use std::fs::File;
    use std::io::Write;

    /// Builds the literal corpus: versions `{1, 3, 4, 5, 7}`,
    /// `1` up+down, `3` up only, `4` up+down, `5` down only, `7` up+down.
    fn corpus() -> (tempfile::TempDir, FileSource) {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str| {
            let mut f = File::create(dir.path().join(name)).unwrap();
            f.write_all(b"-- noop").unwrap();
        };
        write("1_a.up.sql");
        write("1_a.down.sql");
        write("3_b.up.sql");
        write("4_c.up.sql");
        write("4_c.down.sql");
        write("5_d.down.sql");
        write("7_e.up.sql");
        write("7_e.down.sql");
        let src = FileSource::from_directory(dir.path()).unwrap();
        (dir, src)
    }

    #[test]
    fn scenario_a_migrate_from_nil_to_3() {
        let (_dir, src) = corpus();
        let steps = read(&src, NIL_VERSION, 3).unwrap();
        assert_eq!(
            steps,
            vec![
                Step { source: 1, target: 1 },
                Step { source: 3, target: 3 },
            ]
        );
    }

    #[test]
    fn scenario_b_steps_two_from_one_then_two_more() {
        let (_dir, src) = corpus();
        let plan = read_up(&src, 1, 2).unwrap();
        assert_eq!(plan.short, None);
        assert_eq!(
            plan.steps,
            vec![
                Step { source: 3, target: 3 },
                Step { source: 4, target: 4 },
            ]
        );
        let plan2 = read_up(&src, 4, 2).unwrap();
        assert_eq!(plan2.short, None);
        assert_eq!(
            plan2.steps,
            vec![
                Step { source: 5, target: 5 },
                Step { source: 7, target: 7 },
            ]
        );
    }

    #[test]
    fn scenario_c_down_from_7_reaches_nil() {
        let (_dir, src) = corpus();
        let plan = read_down(&src, 7, -1).unwrap();
        assert_eq!(plan.short, None);
        assert_eq!(
            plan.steps,
            vec![
                Step { source: 7, target: 5 },
                Step { source: 5, target: 4 },
                Step { source: 4, target: 1 },
                Step { source: 1, target: NIL_VERSION },
            ]
        );
    }

    #[test]
    fn scenario_d_migrate_to_unknown_version_not_found() {
        let (_dir, src) = corpus();
        let err = read(&src, NIL_VERSION, 2).unwrap_err();
        assert!(matches!(err, MigrateError::NotFound(2)));
    }

    #[test]
    fn scenario_f_steps_ten_from_one_short_limit() {
        let (_dir, src) = corpus();
        let plan = read_up(&src, 1, 10).unwrap();
        assert_eq!(plan.short, Some(6));
        assert_eq!(
            plan.steps,
            vec![
                Step { source: 3, target: 3 },
                Step { source: 4, target: 4 },
                Step { source: 5, target: 5 },
                Step { source: 7, target: 7 },
            ]
        );
    }

    #[test]
    fn migrate_to_same_version_is_no_change() {
        let (_dir, src) = corpus();
        let err = read(&src, 3, 3).unwrap_err();
        assert!(matches!(err, MigrateError::NoChange));
    }

    #[test]
    fn steps_zero_is_no_change() {
        let (_dir, src) = corpus();
        assert!(matches!(read_up(&src, 1, 0).unwrap_err(), MigrateError::NoChange));
        assert!(matches!(read_down(&src, 1, 0).unwrap_err(), MigrateError::NoChange));
    }

    #[test]
    fn down_from_nil_unbounded_is_no_change() {
        let (_dir, src) = corpus();
        assert!(matches!(
            read_down(&src, NIL_VERSION, -1).unwrap_err(),
            MigrateError::NoChange
        ));
    }

    #[test]
    fn build_migration_for_absent_script_is_empty() {
        let (_dir, src) = corpus();
        // version 3 has no down script
        let m = build_migration(&src, Step { source: 3, target: 1 }).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.identifier, "<empty>");
    }
}
