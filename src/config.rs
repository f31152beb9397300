//! Runtime configuration.
//!
//! Built once in `main` from, in increasing priority:
//! built-in defaults, an optional TOML file, `MUSEO_`-prefixed environment
//! variables (nested with `__`, e.g. `MUSEO_DATABASE__HOST`), and the
//! `DB_HOST`/`DB_PORT`/`DB_USER`/`DB_PASSWORD`/`DB_NAME`/`DB_SSL` variables
//! the backend deployment already exports.
//!
//! Credentials have no defaults. A missing user or password is reported by
//! the connection factory instead of being papered over here.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    value::{Uncased, UncasedStr},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::OpsError;
use crate::report::Format as ReportFormat;

pub const DEFAULT_CONFIG_FILE: &str = "museo-ops.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub database: DatabaseConfig,
    pub probe: ProbeConfig,
    pub server: ServerConfig,
    pub report: ReportConfig,
    pub accounts: AccountsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BasicConfig {
    pub loglevel: String,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            loglevel: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    #[serde(deserialize_with = "scalar_string")]
    pub user: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub password: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub database: Option<String>,
    pub ssl: SslSetting,
    /// CA bundle used when `ssl = "verified"`.
    pub ssl_ca: Option<PathBuf>,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: None,
            password: None,
            database: None,
            ssl: SslSetting::Disabled,
            ssl_ca: None,
            connect_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// `host:port` without credentials, safe for logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Accepts a string, or a number or bool that figment typed from the
/// environment or TOML, as a string.
fn scalar_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Flag(bool),
    }

    Ok(Option::<Scalar>::deserialize(d)?.map(|v| match v {
        Scalar::Text(s) => s,
        Scalar::Unsigned(n) => n.to_string(),
        Scalar::Signed(n) => n.to_string(),
        Scalar::Float(n) => n.to_string(),
        Scalar::Flag(b) => b.to_string(),
    }))
}

/// Transport security for the MySQL session.
///
/// `Relaxed` encrypts without verifying the server certificate, which hosted
/// providers with self-issued certificates require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(try_from = "SslValue", rename_all = "lowercase")]
pub enum SslSetting {
    #[default]
    Disabled,
    Relaxed,
    Verified,
}

/// Accepts `ssl = true`, `DB_SSL=1` and the named modes.
#[derive(Deserialize)]
#[serde(untagged)]
enum SslValue {
    Flag(bool),
    Num(u64),
    Mode(String),
}

impl TryFrom<SslValue> for SslSetting {
    type Error = String;

    fn try_from(v: SslValue) -> Result<Self, Self::Error> {
        match v {
            SslValue::Flag(true) => Ok(SslSetting::Relaxed),
            SslValue::Flag(false) | SslValue::Num(0) => Ok(SslSetting::Disabled),
            SslValue::Num(1) => Ok(SslSetting::Relaxed),
            SslValue::Num(n) => Err(format!("unknown ssl mode {n}")),
            SslValue::Mode(s) => match s.trim().to_ascii_lowercase().as_str() {
                "disabled" | "off" | "false" | "0" => Ok(SslSetting::Disabled),
                "relaxed" | "on" | "true" | "1" | "required" => Ok(SslSetting::Relaxed),
                "verified" | "verify" | "verify_identity" => Ok(SslSetting::Verified),
                other => Err(format!("unknown ssl mode {other:?}")),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,
    /// Leading characters of a secret shown in previews.
    pub preview_chars: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::Text,
            preview_chars: 10,
        }
    }
}

/// Where the backend keeps login credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountsConfig {
    pub table: String,
    pub username_column: String,
    pub password_column: String,
    pub bcrypt_cost: u32,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            table: "system_user".to_string(),
            username_column: "username".to_string(),
            password_column: "password".to_string(),
            bcrypt_cost: 10,
        }
    }
}

impl Config {
    /// Load configuration from `path` (missing file is fine) and the environment.
    pub fn load(path: &Path) -> Result<Self, OpsError> {
        let config: Self = Self::figment(path).extract()?;
        Ok(config)
    }

    pub fn figment(path: &Path) -> Figment {
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("MUSEO_").split("__"))
            .merge(Env::raw().only(&["DB_HOST", "DB_PORT", "DB_SSL"]).map(db_var_key));

        // Credentials are taken verbatim: env parsing would read "0123" as 123.
        Env::raw()
            .only(&["DB_USER", "DB_PASSWORD", "DB_NAME"])
            .map(db_var_key)
            .iter()
            .fold(figment, |figment, (key, value)| {
                figment.merge(Serialized::default(key.as_str(), value))
            })
    }
}

fn db_var_key(var: &UncasedStr) -> Uncased<'_> {
    let field = match var.as_str().to_ascii_uppercase().as_str() {
        "DB_HOST" => "database.host",
        "DB_PORT" => "database.port",
        "DB_USER" => "database.user",
        "DB_PASSWORD" => "database.password",
        "DB_NAME" => "database.database",
        _ => "database.ssl",
    };
    field.into()
}
