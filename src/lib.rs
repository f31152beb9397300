pub mod cli;
pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod migrate;
pub mod probe;
pub mod report;
pub mod routines;
pub mod server;

pub use config::Config;
pub use error::OpsError;
pub use report::{Record, Reporter};
