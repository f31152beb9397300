//! One routine per invocation: gather input, open a session if the routine
//! needs one, run it, and release the session on every exit path.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::cli::{Command, PdfCommand};
use crate::config::Config;
use crate::convert;
use crate::db::{Session, queries};
use crate::error::OpsError;
use crate::migrate::{Manifest, MigrationRunner, StatementOutcome};
use crate::probe;
use crate::report::{Record, Reporter};
use crate::server;

/// Work that needs a database session, with all local input already read.
#[derive(Debug)]
pub enum DbTask<'a> {
    Ping,
    TableExists(&'a str),
    ColumnExists(&'a str, &'a str),
    Columns(&'a str),
    Count(&'a str),
    Migrate(Manifest),
    ShowUser(&'a str),
    ResetPassword { username: &'a str, password: String },
    VerifyPassword { username: &'a str, password: String },
}

pub async fn run<W: Write>(
    cmd: &Command,
    cfg: &Config,
    reporter: &mut Reporter<W>,
) -> Result<(), OpsError> {
    let task = match cmd {
        Command::Probe {
            target_host,
            target_port,
            timeout,
        } => {
            let host = target_host.as_deref().unwrap_or(&cfg.database.host);
            let port = target_port.unwrap_or(cfg.database.port);
            let limit = Duration::from_secs(timeout.unwrap_or(cfg.probe.timeout_secs));
            return run_probe(host, port, limit, reporter).await;
        }
        Command::Serve { listen_port } => {
            let mut cfg = cfg.clone();
            if let Some(port) = listen_port {
                cfg.server.port = *port;
            }
            return server::serve(&cfg).await;
        }
        Command::Pdf { action } => return run_pdf(action, reporter),
        Command::Ping => DbTask::Ping,
        Command::TableExists { table } => DbTask::TableExists(table),
        Command::ColumnExists { table, column } => DbTask::ColumnExists(table, column),
        Command::Columns { table } => DbTask::Columns(table),
        Command::Count { table } => DbTask::Count(table),
        Command::Migrate { dir, only, up_to } => {
            let manifest = match dir {
                Some(dir) => Manifest::from_dir(dir)?,
                None => Manifest::bundled()?,
            };
            DbTask::Migrate(manifest.select(*only, *up_to)?)
        }
        Command::ApplySql { file } => DbTask::Migrate(Manifest::single(file)?),
        Command::ShowUser { username } => DbTask::ShowUser(username),
        Command::ResetPassword { username } => DbTask::ResetPassword {
            username,
            password: read_secret(io::stdin().lock(), "new password")?,
        },
        Command::VerifyPassword { username } => DbTask::VerifyPassword {
            username,
            password: read_secret(io::stdin().lock(), "password")?,
        },
    };

    let session = Session::open(&cfg.database).await?;
    let result = run_task(&task, &session, cfg, reporter).await;
    session.close().await;
    result
}

pub async fn run_task<W: Write>(
    task: &DbTask<'_>,
    session: &Session,
    cfg: &Config,
    reporter: &mut Reporter<W>,
) -> Result<(), OpsError> {
    let pool = session.pool();
    match task {
        DbTask::Ping => {
            let info = queries::ping(pool).await?;
            reporter.emit(&Record::Connected {
                endpoint: session.endpoint().to_string(),
                server_version: info.version,
                database: info.database,
                user: info.current_user,
            })?;
        }
        DbTask::TableExists(table) => {
            let exists = queries::table_exists(pool, table).await?;
            reporter.emit(&Record::Exists {
                subject: (*table).to_string(),
                exists,
                note: (!exists).then(|| "table does not exist".to_string()),
            })?;
        }
        DbTask::ColumnExists(table, column) => {
            let exists = queries::column_exists(pool, table, column).await?;
            reporter.emit(&Record::Exists {
                subject: format!("{table}.{column}"),
                exists,
                note: (!exists).then(|| "column does not exist".to_string()),
            })?;
        }
        DbTask::Columns(table) => {
            let columns = queries::list_columns(pool, table).await?;
            if columns.is_empty() {
                warn!(table = %table, "no columns found; table may not exist");
            }
            reporter.emit(&Record::Columns {
                table: (*table).to_string(),
                columns: columns
                    .into_iter()
                    .map(|c| {
                        let nullable = if c.nullable { "?" } else { "" };
                        format!("{}:{}{nullable}", c.name, c.column_type)
                    })
                    .collect(),
            })?;
        }
        DbTask::Count(table) => {
            let rows = queries::count_rows(pool, table).await?;
            reporter.emit(&Record::RowCount {
                table: (*table).to_string(),
                rows,
            })?;
        }
        DbTask::Migrate(manifest) => {
            if manifest.is_empty() {
                warn!("no migrations selected");
            }
            let runner = MigrationRunner::new(pool);
            for migration in manifest.migrations() {
                let report = runner.apply(migration).await?;
                for (idx, outcome) in report.statements.iter().enumerate() {
                    let (rows_affected, code, detail) = match outcome {
                        StatementOutcome::Applied { rows_affected } => {
                            (Some(*rows_affected), None, None)
                        }
                        StatementOutcome::AlreadyPresent { code, message } => {
                            (None, *code, Some(message.clone()))
                        }
                    };
                    reporter.emit(&Record::Statement {
                        migration: report.migration.clone(),
                        index: idx + 1,
                        outcome: outcome.label(),
                        rows_affected,
                        code,
                        detail,
                    })?;
                }
                reporter.emit(&Record::Migration {
                    migration: report.migration.clone(),
                    applied: report.applied(),
                    already_present: report.already_present(),
                })?;
            }
        }
        DbTask::ShowUser(username) => {
            let account = queries::find_account(pool, &cfg.accounts, username).await?;
            reporter.emit(&Record::Exists {
                subject: format!("{}:{username}", cfg.accounts.table),
                exists: account.is_some(),
                note: account.is_none().then(|| "account does not exist".to_string()),
            })?;
            if let Some(account) = account {
                if !account.looks_like_bcrypt() {
                    warn!(username = %username, "stored password is not a bcrypt hash");
                }
                let mut record = Record::secret(
                    username.to_string(),
                    cfg.accounts.password_column.clone(),
                    reporter.preview(&account.password_hash),
                );
                if let Record::Secret { scheme, .. } = &mut record {
                    *scheme = account.hash_scheme().map(str::to_string);
                }
                reporter.emit(&record)?;
            }
        }
        DbTask::ResetPassword { username, password } => {
            if queries::find_account(pool, &cfg.accounts, username)
                .await?
                .is_none()
            {
                return Err(OpsError::UserNotFound(username.to_string()));
            }
            let hash = hash_password(password.clone(), cfg.accounts.bcrypt_cost).await?;
            let rows = queries::set_password_hash(pool, &cfg.accounts, username, &hash).await?;
            info!(username = %username, rows, "password hash updated");
            reporter.emit(&Record::Updated {
                subject: username.to_string(),
                field: cfg.accounts.password_column.clone(),
                rows_affected: rows,
            })?;
            reporter.emit(&Record::secret(
                username.to_string(),
                cfg.accounts.password_column.clone(),
                reporter.preview(&hash),
            ))?;
        }
        DbTask::VerifyPassword { username, password } => {
            let account = queries::find_account(pool, &cfg.accounts, username)
                .await?
                .ok_or_else(|| OpsError::UserNotFound(username.to_string()))?;
            let matches = verify_password(password.clone(), account.password_hash).await?;
            reporter.emit(&Record::PasswordCheck {
                subject: username.to_string(),
                matches,
            })?;
        }
    }
    Ok(())
}

async fn run_probe<W: Write>(
    host: &str,
    port: u16,
    limit: Duration,
    reporter: &mut Reporter<W>,
) -> Result<(), OpsError> {
    let target = format!("{host}:{port}");
    let started = Instant::now();
    let outcome = probe::probe(host, port, limit).await;
    reporter.emit(&outcome.record(&target, started.elapsed()))?;
    outcome.into_result(host, &target).map(|_| ())
}

fn run_pdf<W: Write>(action: &PdfCommand, reporter: &mut Reporter<W>) -> Result<(), OpsError> {
    let (out, bytes) = match action {
        PdfCommand::Encode {
            input,
            out,
            data_uri,
        } => {
            let pdf = std::fs::read(input)?;
            let text = convert::encode_pdf(&pdf, *data_uri);
            std::fs::write(out, &text)?;
            (out, text.len())
        }
        PdfCommand::Decode { input, out } => {
            let text = std::fs::read_to_string(input)?;
            let pdf = convert::decode_pdf(&text)?;
            std::fs::write(out, &pdf)?;
            (out, pdf.len())
        }
        PdfCommand::Stub { out, title } => {
            let pdf = convert::stub_pdf(title);
            std::fs::write(out, &pdf)?;
            (out, pdf.len())
        }
    };
    reporter.emit(&file_record(out, bytes))
}

fn file_record(path: &Path, bytes: usize) -> Record {
    Record::File {
        path: path.display().to_string(),
        bytes,
    }
}

/// Emit the closing `done` or `failed` record and pick the exit code.
///
/// A run whose closing record cannot be written exits as an I/O failure;
/// a failed run keeps its own code.
pub fn finish<W: Write>(
    reporter: &mut Reporter<W>,
    routine: &str,
    result: Result<(), OpsError>,
    elapsed: Duration,
) -> u8 {
    match result {
        Ok(()) => {
            let done = Record::Done {
                routine: routine.to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
                finished_at: chrono::Utc::now().to_rfc3339(),
            };
            match reporter.emit(&done) {
                Ok(()) => 0,
                Err(e) => {
                    warn!(routine, error = %e, "could not write final report record");
                    e.exit_code()
                }
            }
        }
        Err(e) => {
            error!(routine, error = %e, "routine failed");
            if let Err(write_err) = reporter.emit(&Record::failed(routine, &e)) {
                warn!(routine, error = %write_err, "could not write final report record");
            }
            e.exit_code()
        }
    }
}

/// First line of `input` without its line ending. Empty input is refused.
pub fn read_secret<R: BufRead>(mut input: R, what: &str) -> Result<String, OpsError> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        let msg = format!("no {what} given on stdin");
        return Err(io::Error::new(io::ErrorKind::InvalidInput, msg).into());
    }
    Ok(secret)
}

async fn hash_password(password: String, cost: u32) -> Result<String, OpsError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| OpsError::Io(io::Error::other(e)))?
        .map_err(OpsError::from)
}

async fn verify_password(password: String, hash: String) -> Result<bool, OpsError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| OpsError::Io(io::Error::other(e)))?
        .map_err(OpsError::from)
}
