use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use sqlx::mysql::MySqlDatabaseError;
use std::time::Duration;
use thiserror::Error as ThisError;

/// MySQL error numbers that mean "the additive change is already in place".
const ER_TABLE_EXISTS: u16 = 1050;
const ER_DUP_FIELDNAME: u16 = 1060;
const ER_DUP_KEYNAME: u16 = 1061;
const ER_FK_DUP_NAME: u16 = 1826;

#[derive(Debug, ThisError)]
pub enum OpsError {
    #[error("connection to {host} failed [{code}]: {message}")]
    Connection {
        host: String,
        code: String,
        message: String,
    },

    #[error("migration {migration} statement #{statement} failed{}: {message}", fmt_code(.code))]
    Schema {
        migration: String,
        statement: usize,
        code: Option<u16>,
        message: String,
    },

    #[error("query failed{}: {message}", fmt_code(.code))]
    Query { code: Option<u16>, message: String },

    #[error("{target} did not answer within {}ms", .after.as_millis())]
    Timeout { target: String, after: Duration },

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("migration manifest error: {0}")]
    Manifest(String),

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("no account named {0:?}")]
    UserNotFound(String),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),
}

fn fmt_code(code: &Option<u16>) -> String {
    code.map(|c| format!(" [{c}]")).unwrap_or_default()
}

impl From<figment::Error> for OpsError {
    fn from(e: figment::Error) -> Self {
        OpsError::Config(Box::new(e))
    }
}

impl From<SqlxError> for OpsError {
    fn from(e: SqlxError) -> Self {
        let failure = DbFailure::from(&e);
        OpsError::Query {
            code: failure.number,
            message: failure.message,
        }
    }
}

impl OpsError {
    /// Build a connection error from a driver failure while establishing a session.
    pub fn connection(host: impl Into<String>, e: &SqlxError) -> Self {
        let code = match e {
            SqlxError::Database(db) => db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(|m| m.number().to_string())
                .or_else(|| db.code().map(|c| c.into_owned()))
                .unwrap_or_else(|| "DATABASE".to_string()),
            SqlxError::Io(io) => format!("{:?}", io.kind()),
            SqlxError::Tls(_) => "TLS".to_string(),
            SqlxError::PoolTimedOut => "ETIMEDOUT".to_string(),
            SqlxError::Configuration(_) => "CONFIGURATION".to_string(),
            _ => "UNKNOWN".to_string(),
        };
        let message = match e {
            SqlxError::PoolTimedOut => "timed out while establishing the connection".to_string(),
            other => other.to_string(),
        };
        OpsError::Connection {
            host: host.into(),
            code,
            message,
        }
    }

    /// Short machine-readable category for report records.
    pub fn kind(&self) -> &'static str {
        match self {
            OpsError::Connection { .. } => "connection",
            OpsError::Schema { .. } => "schema",
            OpsError::Query { .. } | OpsError::UserNotFound(_) => "query",
            OpsError::Timeout { .. } => "timeout",
            OpsError::Config(_) | OpsError::InvalidIdentifier(_) | OpsError::Manifest(_) => {
                "config"
            }
            OpsError::Io(_) | OpsError::Json(_) => "io",
            OpsError::Hash(_) => "hash",
            OpsError::Decode(_) => "decode",
        }
    }

    /// Driver or transport code, when one exists.
    pub fn code(&self) -> Option<String> {
        match self {
            OpsError::Connection { code, .. } => Some(code.clone()),
            OpsError::Schema { code, .. } | OpsError::Query { code, .. } => {
                code.map(|c| c.to_string())
            }
            _ => None,
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            OpsError::Config(_) | OpsError::InvalidIdentifier(_) | OpsError::Manifest(_) => 2,
            OpsError::Connection { .. } => 3,
            OpsError::Schema { .. } => 4,
            OpsError::Query { .. } | OpsError::UserNotFound(_) => 5,
            OpsError::Timeout { .. } => 6,
            OpsError::Io(_) | OpsError::Json(_) | OpsError::Hash(_) | OpsError::Decode(_) => 1,
        }
    }
}

/// Driver-independent view of a failed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbFailure {
    /// MySQL error number (e.g. 1060).
    pub number: Option<u16>,
    /// Five-character SQLSTATE.
    pub sqlstate: Option<String>,
    pub message: String,
}

impl DbFailure {
    pub fn new(number: Option<u16>, sqlstate: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            number,
            sqlstate: sqlstate.map(str::to_string),
            message: message.into(),
        }
    }

    /// True when the failure says the object an additive DDL statement
    /// creates already exists.
    pub fn is_already_present(&self) -> bool {
        if let Some(n) = self.number {
            return matches!(
                n,
                ER_TABLE_EXISTS | ER_DUP_FIELDNAME | ER_DUP_KEYNAME | ER_FK_DUP_NAME
            );
        }
        matches!(self.sqlstate.as_deref(), Some("42S01") | Some("42S21"))
    }
}

impl From<&SqlxError> for DbFailure {
    fn from(e: &SqlxError) -> Self {
        match e {
            SqlxError::Database(db) => {
                let number = db
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .map(|m| m.number());
                let sqlstate = db.code().map(|c| c.into_owned());
                DbFailure {
                    number,
                    sqlstate,
                    message: db.message().to_string(),
                }
            }
            other => DbFailure {
                number: None,
                sqlstate: None,
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for OpsError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            OpsError::Connection { .. } | OpsError::Timeout { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            OpsError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        let body = ApiErrorBody {
            code: self
                .code()
                .unwrap_or_else(|| self.kind().to_ascii_uppercase()),
            kind: self.kind(),
            message: self.to_string(),
        };
        (status, Json(ApiErrorResponse { error: body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_column_number_is_recoverable() {
        let f = DbFailure::new(Some(1060), Some("42S21"), "Duplicate column name 'x'");
        assert!(f.is_already_present());
    }

    #[test]
    fn number_wins_over_sqlstate() {
        // 1146 "table doesn't exist" shares the 42S02 family, never recoverable
        let f = DbFailure::new(Some(1146), Some("42S01"), "Table 'museosmart.t' doesn't exist");
        assert!(!f.is_already_present());
    }

    #[test]
    fn sqlstate_fallback_without_number() {
        assert!(DbFailure::new(None, Some("42S01"), "exists").is_already_present());
        assert!(!DbFailure::new(None, Some("42000"), "syntax").is_already_present());
        assert!(!DbFailure::new(None, None, "Duplicate column name 'x'").is_already_present());
    }

    #[test]
    fn exit_codes_are_distinct_per_category() {
        let conn = OpsError::Connection {
            host: "db".into(),
            code: "1045".into(),
            message: "Access denied".into(),
        };
        let schema = OpsError::Schema {
            migration: "001_x".into(),
            statement: 1,
            code: Some(1064),
            message: "syntax".into(),
        };
        let timeout = OpsError::Timeout {
            target: "db:3306".into(),
            after: Duration::from_secs(5),
        };
        assert_eq!(conn.exit_code(), 3);
        assert_eq!(schema.exit_code(), 4);
        assert_eq!(timeout.exit_code(), 6);
        assert_eq!(schema.code().as_deref(), Some("1064"));
        assert!(schema.to_string().contains("[1064]: syntax"));
    }
}
