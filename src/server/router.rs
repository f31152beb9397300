use axum::{Router, routing::get};
use std::sync::Arc;
use std::time::Instant;

use crate::config::DatabaseConfig;
use crate::server::handlers;

#[derive(Clone)]
pub struct OpsState {
    pub db: Arc<DatabaseConfig>,
    pub started: Instant,
}

impl OpsState {
    pub fn new(db: DatabaseConfig) -> Self {
        Self {
            db: Arc::new(db),
            started: Instant::now(),
        }
    }
}

pub fn ops_router(state: OpsState) -> Router {
    Router::new()
        .route("/", get(handlers::banner))
        .route("/healthz", get(handlers::health))
        .route("/healthz/db", get(handlers::db_health))
        .with_state(state)
}
