//! HTTP Gateway
//!
//! Ingestion API: accept transaction intents, serve their state, report
//! health. Control flow is one-directional; nothing below ever calls back
//! into this layer.

pub mod handlers;
pub mod service;
pub mod state;
pub mod types;

use std::future::Future;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::config::ServerConfig;
pub use service::{SubmissionService, SubmitDisposition};
pub use state::AppState;

/// Build the API router
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/transactions", post(handlers::submit_transaction))
        .route("/api/transactions/{id}", get(handlers::get_transaction))
        .route("/api/health", get(handlers::health_check))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Run the HTTP server until the shutdown future resolves.
///
/// In-flight requests drain before the call returns.
pub async fn run_server(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state, Duration::from_secs(config.timeout_secs));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
