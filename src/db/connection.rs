use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{DatabaseConfig, SslSetting};
use crate::error::OpsError;

/// One live database session owned by a single routine.
///
/// Backed by a pool capped at one connection. [`Session::close`] consumes the
/// session, so release happens at most once.
pub struct Session {
    pool: MySqlPool,
    endpoint: String,
}

impl Session {
    /// Validate credentials, then connect eagerly so failures surface here.
    ///
    /// The configured timeout bounds connection establishment only.
    pub async fn open(cfg: &DatabaseConfig) -> Result<Self, OpsError> {
        let opts = connect_options(cfg)?;
        let endpoint = cfg.endpoint();
        let started = Instant::now();

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(cfg.connect_timeout())
            .connect_with(opts)
            .await
            .map_err(|e| OpsError::connection(cfg.host.clone(), &e))?;

        info!(
            endpoint = %endpoint,
            ssl = ?cfg.ssl,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "database session opened"
        );
        Ok(Self { pool, endpoint })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Release the connection. Waits for it to be returned and closed.
    pub async fn close(self) {
        self.pool.close().await;
        debug!(endpoint = %self.endpoint, "database session closed");
    }
}

/// Build driver options from config, rejecting missing credentials before any
/// network I/O.
pub fn connect_options(cfg: &DatabaseConfig) -> Result<MySqlConnectOptions, OpsError> {
    let missing = |what: &str| OpsError::Connection {
        host: cfg.host.clone(),
        code: "MISSING_CREDENTIALS".to_string(),
        message: format!("database {what} is not configured"),
    };

    if cfg.host.trim().is_empty() {
        return Err(missing("host"));
    }
    let user = cfg
        .user
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| missing("user"))?;
    // An empty password is an explicit choice; an absent one is not.
    let password = cfg.password.as_deref().ok_or_else(|| missing("password"))?;

    let mut opts = MySqlConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .username(user)
        .password(password)
        .charset("utf8mb4");

    if let Some(db) = cfg.database.as_deref().filter(|d| !d.is_empty()) {
        opts = opts.database(db);
    }

    opts = match cfg.ssl {
        SslSetting::Disabled => opts.ssl_mode(MySqlSslMode::Disabled),
        SslSetting::Relaxed => opts.ssl_mode(MySqlSslMode::Required),
        SslSetting::Verified => {
            let opts = opts.ssl_mode(MySqlSslMode::VerifyIdentity);
            match cfg.ssl_ca.as_ref() {
                Some(ca) => opts.ssl_ca(ca),
                None => opts,
            }
        }
    };

    Ok(opts)
}
