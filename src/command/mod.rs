//! CLI-only helpers that don't belong on `Migrator` itself.

mod create;

pub use create::create;
