use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{error, info};

use txgate::config::AppConfig;
use txgate::gateway::{self, AppState, SubmissionService};
use txgate::logging;
use txgate::posting::HttpPostingClient;
use txgate::queue::WorkQueue;
use txgate::store::StateStore;
use txgate::worker::{PoolConfig, WorkerPool};

// Queue retention windows (completed jobs: whichever bound hits first)
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const COMPLETED_RETENTION: Duration = Duration::from_secs(3_600);
const COMPLETED_MAX: i64 = 1_000;
const FAILED_RETENTION: Duration = Duration::from_secs(86_400);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("TXG_ENV").unwrap_or_else(|_| "default".to_string());
    let config = AppConfig::load(&env)?;

    let _guard = logging::init_logging(&config);
    info!(env = %env, "txgate starting");

    let pool = PgPoolOptions::new()
        .max_connections(config.store.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url())
        .await
        .context("Failed to connect to the backing store")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database migrations completed");

    // Wire leaves-first: store → queue → posting client → workers → gateway.
    // Components own cloned handles; no singletons, no back-references.
    let store = Arc::new(StateStore::new(pool.clone(), config.state_ttl()));
    let queue = Arc::new(WorkQueue::new(pool.clone(), &config.queue));
    let posting = Arc::new(
        HttpPostingClient::new(config.posting.url.clone(), config.posting_timeout())
            .context("Failed to build posting client")?,
    );
    info!(url = %config.posting.url, "Posting client initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_pool = Arc::new(WorkerPool::new(
        store.clone(),
        queue.clone(),
        posting,
        PoolConfig::from(&config.queue),
    ));
    let worker_handles = worker_pool.spawn(shutdown_rx.clone());

    let sweeper = tokio::spawn(run_sweeper(
        store.clone(),
        queue.clone(),
        shutdown_rx.clone(),
    ));

    let submission = Arc::new(SubmissionService::new(store, queue));
    let app_state = AppState::new(submission);

    gateway::run_server(&config.server, app_state, shutdown_signal(shutdown_tx)).await?;

    // HTTP has drained; workers finish their current job, nothing mid-step
    // is cancelled. Unstarted jobs stay queued for the next start.
    info!("Draining workers");
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = sweeper.await;
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}

/// Resolve on SIGINT/SIGTERM and flip the shared shutdown flag
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received, stopping intake");
    let _ = shutdown_tx.send(true);
}

/// Background maintenance: state TTL purge and queue retention
async fn run_sweeper(
    store: Arc<StateStore>,
    queue: Arc<WorkQueue>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match store.purge_expired().await {
            Ok(0) => {}
            Ok(n) => info!(purged = n, "Purged expired state records"),
            Err(e) => error!(error = %e, "State purge failed"),
        }

        match queue
            .purge(COMPLETED_RETENTION, COMPLETED_MAX, FAILED_RETENTION)
            .await
        {
            Ok(0) => {}
            Ok(n) => info!(purged = n, "Purged retained queue jobs"),
            Err(e) => error!(error = %e, "Queue purge failed"),
        }
    }

    info!("Maintenance sweeper stopped");
}
