//! A database schema migration engine: given a linearly versioned sequence
//! of forward ("up") and reverse ("down") migration scripts, drives a
//! target database from one schema version to another, recording every
//! applied migration, serializing concurrent migrators, and leaving an
//! explicit "dirty" marker behind a failed migration instead of silent
//! partial state.
//!
//! The engine (`migrator`, `planner`, `pipeline`, `version`, `migration`,
//! `error`) only ever talks to two traits: [`source::SourceDriver`] and
//! [`database::DatabaseDriver`]. Concrete corpora and databases plug in
//! through those traits; this crate ships one of each ([`source::file`],
//! [`database::sqlite`]) as a reference pairing.

pub mod database;
pub mod error;
pub mod migration;
pub mod migrator;
pub mod planner;
pub mod pipeline;
pub mod source;
pub mod url;
pub mod version;

pub use error::{DatabaseError, MigrateError, Result, SourceError};
pub use migration::Migration;
pub use migrator::Migrator;
pub use pipeline::GracefulStop;
pub use version::{Direction, Version, VersionIndex, NIL_VERSION};
