//! Ordered, re-runnable schema migrations.
//!
//! Each migration is a plain SQL file named `NNN_name.sql`. There is no
//! version table: order comes from the manifest, and every statement is
//! either naturally idempotent (`IF NOT EXISTS`) or fails with an
//! "already exists" error the runner treats as success.

pub mod manifest;
pub mod runner;
pub mod split;

pub use manifest::{Manifest, Migration, MigrationSource};
pub use runner::{MigrationReport, MigrationRunner, StatementOutcome};
pub use split::split_statements;
