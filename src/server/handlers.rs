use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::time::Instant;
use tracing::info;

use crate::db::{Session, queries};
use crate::error::OpsError;
use crate::server::router::OpsState;

pub async fn banner() -> String {
    format!("museo-ops {} debug server\n", env!("CARGO_PKG_VERSION"))
}

pub async fn health(State(state): State<OpsState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started.elapsed().as_secs(),
    }))
}

/// Open a session with the server's own config, ping, and release it.
pub async fn db_health(State(state): State<OpsState>) -> Result<Json<Value>, OpsError> {
    let started = Instant::now();
    let session = Session::open(&state.db).await?;
    let ping = queries::ping(session.pool()).await;
    session.close().await;
    let info = ping?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(endpoint = %state.db.endpoint(), elapsed_ms, "database health check passed");
    Ok(Json(json!({
        "status": "ok",
        "endpoint": state.db.endpoint(),
        "server_version": info.version,
        "database": info.database,
        "elapsed_ms": elapsed_ms,
    })))
}
