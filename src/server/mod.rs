//! Minimal HTTP surface for checking a deployment from the outside:
//! is the process up, and can it reach the database with its config.

pub mod handlers;
pub mod router;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::error::OpsError;

pub use router::{OpsState, ops_router};

/// Serve until Ctrl-C.
pub async fn serve(cfg: &Config) -> Result<(), OpsError> {
    let state = OpsState::new(cfg.database.clone());
    let app = ops_router(state);

    let addr = cfg.server.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
