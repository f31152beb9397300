//! Structured outcome reporting.
//!
//! Every routine emits [`Record`]s through a [`Reporter`]. Text output is one
//! `kind=... key=value` line per record; JSON output is one object per line.
//! Secrets only ever leave through [`Preview`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Write};

use crate::error::OpsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Text,
    Json,
}

/// Redacted view of a secret value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub prefix: String,
    pub length: usize,
}

impl Preview {
    /// Keep at most `chars` leading characters, and never more than half of
    /// the secret, so the full value cannot be reconstructed from a preview.
    pub fn of(secret: &str, chars: usize) -> Self {
        let length = secret.chars().count();
        let shown = chars.min(length / 2);
        Self {
            prefix: secret.chars().take(shown).collect(),
            length,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Connected {
        endpoint: String,
        server_version: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        database: Option<String>,
        user: String,
    },
    Exists {
        subject: String,
        exists: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Columns {
        table: String,
        columns: Vec<String>,
    },
    RowCount {
        table: String,
        rows: i64,
    },
    Statement {
        migration: String,
        index: usize,
        outcome: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        rows_affected: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Migration {
        migration: String,
        applied: usize,
        already_present: usize,
    },
    Secret {
        subject: String,
        field: String,
        preview: String,
        length: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        scheme: Option<String>,
    },
    PasswordCheck {
        subject: String,
        matches: bool,
    },
    Updated {
        subject: String,
        field: String,
        rows_affected: u64,
    },
    Probe {
        target: String,
        outcome: &'static str,
        elapsed_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    File {
        path: String,
        bytes: usize,
    },
    Done {
        routine: String,
        elapsed_ms: u64,
        finished_at: String,
    },
    Failed {
        routine: String,
        error: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },
}

impl Record {
    pub fn failed(routine: impl Into<String>, err: &OpsError) -> Self {
        Record::Failed {
            routine: routine.into(),
            error: err.kind(),
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn secret(subject: impl Into<String>, field: impl Into<String>, preview: Preview) -> Self {
        Record::Secret {
            subject: subject.into(),
            field: field.into(),
            preview: preview.prefix,
            length: preview.length,
            scheme: None,
        }
    }
}

pub struct Reporter<W: Write = io::Stdout> {
    out: W,
    format: Format,
    preview_chars: usize,
}

impl Reporter<io::Stdout> {
    pub fn stdout(format: Format, preview_chars: usize) -> Self {
        Self::new(io::stdout(), format, preview_chars)
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: Format, preview_chars: usize) -> Self {
        Self {
            out,
            format,
            preview_chars,
        }
    }

    pub fn preview(&self, secret: &str) -> Preview {
        Preview::of(secret, self.preview_chars)
    }

    pub fn emit(&mut self, record: &Record) -> Result<(), OpsError> {
        let line = match self.format {
            Format::Json => serde_json::to_string(record)?,
            Format::Text => render_text(&serde_json::to_value(record)?),
        };
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// `kind` first, remaining fields sorted by key.
fn render_text(value: &Value) -> String {
    let Some(map) = value.as_object() else {
        return value.to_string();
    };
    let mut parts = Vec::with_capacity(map.len());
    if let Some(kind) = map.get("kind") {
        parts.push(format!("kind={}", text_value(kind)));
    }
    let mut rest: Vec<_> = map.iter().filter(|(k, _)| k.as_str() != "kind").collect();
    rest.sort_by(|a, b| a.0.cmp(b.0));
    parts.extend(rest.into_iter().map(|(k, v)| format!("{k}={}", text_value(v))));
    parts.join(" ")
}

fn text_value(v: &Value) -> String {
    let raw = match v {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|i| match i {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    };
    if raw.is_empty() || raw.chars().any(|c| c.is_whitespace() || c == '"' || c == '=') {
        format!("{raw:?}")
    } else {
        raw
    }
}
