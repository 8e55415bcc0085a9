//! The `SourceDriver` contract: a corpus of migration scripts
//! addressed by a URL. The engine only ever talks to a source through this
//! trait; concrete corpora (a directory of files, an object store, a VCS
//! ref) are out of scope for the core and plug in here.

use std::io::Read;

use crate::error::SourceError;
use crate::version::Version;

pub mod file;

/// Result of reading a migration body: the stream plus a short, human
/// identifier (a file name without its extension, say) used for logging.
pub type ScriptBody = (Box<dyn Read + Send>, String);

/// Outcome of `read_up`/`read_down` for a given version.
pub enum ReadOutcome {
    /// The script exists and has a body.
    Found(ScriptBody),
    /// The version exists in the corpus but has no body for this
    /// direction; the planner treats this as a no-op version step.
    Exists,
    /// No script, and no record at all, for this version/direction.
    NotFound,
}

/// A corpus of versioned migration scripts.
///
/// Implementors must make `first`/`prev`/`next` stable across repeated
/// calls, and must allow `read_up`/`read_down` to be called concurrently
/// for different versions (the engine prefetches several migrations ahead).
///
/// The provider thread holds only a `&dyn SourceDriver` borrowed from the
/// caller's stack, so the trait object itself must cross into that thread;
/// `&T` is `Send` only when `T: Sync`, hence the `Sync` bound here.
pub trait SourceDriver: Send + Sync {
    /// Open the corpus addressed by `url`. Called exactly once per
    /// instance.
    fn open(url: &str) -> Result<Self, SourceError>
    where
        Self: Sized;

    /// Release any held resources. Best-effort; errors are reported, not
    /// recovered from.
    fn close(&mut self) -> Result<(), SourceError>;

    /// The smallest known version, if the corpus is non-empty.
    fn first(&self) -> Result<Option<Version>, SourceError>;

    /// The greatest known version strictly less than `v`.
    fn prev(&self, v: Version) -> Result<Option<Version>, SourceError>;

    /// The smallest known version strictly greater than `v`.
    fn next(&self, v: Version) -> Result<Option<Version>, SourceError>;

    /// The up script for `v`. See `ReadOutcome` for the possible results.
    fn read_up(&self, v: Version) -> Result<ReadOutcome, SourceError>;

    /// The down script for `v`, with the same sentinels as `read_up`.
    fn read_down(&self, v: Version) -> Result<ReadOutcome, SourceError>;
}
