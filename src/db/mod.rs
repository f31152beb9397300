//! Database access: session lifecycle, the raw statement seam, and the
//! read/update helpers routines are built from.
//!
//! Layout:
//! - `connection.rs`: config -> options, single-connection `Session`
//! - `executor.rs`: `SqlExecutor`, the seam the migration runner drives
//! - `models.rs`: rows returned by queries
//! - `queries.rs`: existence checks, counts, account lookups

pub mod connection;
pub mod executor;
pub mod models;
pub mod queries;

pub use connection::Session;
pub use executor::SqlExecutor;
pub use models::{AccountRow, ColumnInfo, ServerInfo};
