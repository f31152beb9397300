use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::report::Format;

#[derive(Parser, Debug)]
#[command(
    name = "museo-ops",
    author,
    version,
    about = "Operational routines for the museum collection database",
    long_about = "Each invocation runs exactly one routine: a migration, a schema or \
                  account check, a connectivity probe, or the debug HTTP server. \
                  Results are printed as key=value lines (or JSON with --format json)."
)]
pub struct Cli {
    /// Path to the TOML configuration file (missing file is fine)
    #[arg(
        short = 'c',
        long,
        env = "MUSEO_CONFIG",
        default_value = DEFAULT_CONFIG_FILE,
        global = true
    )]
    pub config: PathBuf,

    /// Output format for report records
    #[arg(long, value_enum, global = true)]
    pub format: Option<Format>,

    /// Override database.host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Override database.port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Override database.user
    #[arg(short = 'u', long, global = true)]
    pub user: Option<String>,

    /// Override database.database
    #[arg(short = 'd', long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Command-line flags win over every other source.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(format) = self.format {
            cfg.report.format = format;
        }
        if let Some(host) = &self.host {
            cfg.database.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.database.port = port;
        }
        if let Some(user) = &self.user {
            cfg.database.user = Some(user.clone());
        }
        if let Some(database) = &self.database {
            cfg.database.database = Some(database.clone());
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and report server version, schema and user
    Ping,

    /// Report whether a table exists in the current schema (read-only)
    TableExists { table: String },

    /// Report whether a column exists (read-only)
    ColumnExists { table: String, column: String },

    /// List a table's columns
    Columns { table: String },

    /// Count a table's rows
    Count { table: String },

    /// Apply migrations in version order; safe to rerun
    Migrate {
        /// Directory of NNN_name.sql files instead of the bundled set
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Apply only this version
        #[arg(long, conflicts_with = "up_to")]
        only: Option<u32>,

        /// Apply versions up to and including this one
        #[arg(long)]
        up_to: Option<u32>,
    },

    /// Apply a single SQL file
    ApplySql { file: PathBuf },

    /// Report whether an account exists and preview its password hash
    ShowUser { username: String },

    /// Set a new password read from stdin (stored as a bcrypt hash)
    ResetPassword { username: String },

    /// Check a password read from stdin against the stored hash
    VerifyPassword { username: String },

    /// Raw TCP reachability check (defaults to the configured database)
    Probe {
        #[arg(value_name = "HOST")]
        target_host: Option<String>,
        #[arg(value_name = "PORT")]
        target_port: Option<u16>,

        /// Seconds before giving up (default: probe.timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Minimal HTTP server for deployment debugging
    Serve {
        /// Override server.port
        #[arg(long)]
        listen_port: Option<u16>,
    },

    /// Convert between PDF files and base64 text
    Pdf {
        #[command(subcommand)]
        action: PdfCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum PdfCommand {
    /// PDF file -> base64 text file
    Encode {
        input: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        /// Prefix with data:application/pdf;base64,
        #[arg(long)]
        data_uri: bool,
    },
    /// base64 text (or data URI) file -> PDF file
    Decode {
        input: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Write a one-page placeholder PDF
    Stub {
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long, default_value = "Report placeholder")]
        title: String,
    },
}

impl Command {
    /// Routine name used in report records and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::TableExists { .. } => "table-exists",
            Command::ColumnExists { .. } => "column-exists",
            Command::Columns { .. } => "columns",
            Command::Count { .. } => "count",
            Command::Migrate { .. } => "migrate",
            Command::ApplySql { .. } => "apply-sql",
            Command::ShowUser { .. } => "show-user",
            Command::ResetPassword { .. } => "reset-password",
            Command::VerifyPassword { .. } => "verify-password",
            Command::Probe { .. } => "probe",
            Command::Serve { .. } => "serve",
            Command::Pdf { .. } => "pdf",
        }
    }
}
