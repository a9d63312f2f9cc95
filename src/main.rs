//! bank_core server
//!
//! Serves the balance and transfer API. Transfers commit to the in-process
//! cache tier and are reconciled into PostgreSQL by a background worker.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bank_core::api::{self, AppState};
use bank_core::audit::PgAuditSink;
use bank_core::db;
use bank_core::handlers::TransferOrchestrator;
use bank_core::notify::LogNotifier;
use bank_core::reconciliation::{self, ReconciliationWorker};
use bank_core::store::{MemoryAccountStore, PgLedgerStore};
use bank_core::Config;

/// Initialize tracing/logging
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bank_core=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config);

    let addr: SocketAddr = config.bind_address().parse()?;

    tracing::info!(environment = %config.environment, "Starting bank_core server");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    db::verify_connection(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let ledger = Arc::new(PgLedgerStore::new(pool.clone()));
    let cache = Arc::new(MemoryAccountStore::new());
    db::warm_account_cache(ledger.as_ref(), cache.as_ref()).await?;

    let (queue, receiver) = reconciliation::channel(config.reconciliation.queue_capacity);
    let stats = queue.stats();
    let worker = ReconciliationWorker::new(ledger.clone(), receiver, config.reconciliation.into()).start();

    let audit = Arc::new(PgAuditSink::new(pool.clone()));

    let orchestrator = TransferOrchestrator::new(
        cache.clone(),
        ledger,
        Arc::new(queue),
        Arc::new(LogNotifier),
        audit.clone(),
    )
    .with_max_transfer_amount(config.max_transfer_amount);

    let state = AppState::new(orchestrator, cache, audit, stats);
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    // The router owns the last queue handle; it is dropped when serving ends
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped, draining reconciliation queue...");
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Reconciliation worker terminated abnormally");
    }

    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
