//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod response;
pub mod routes;

pub use response::ApiResponse;
pub use routes::create_router;

use axum::http::Method;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::audit::AuditSink;
use crate::handlers::{AccessGuard, BalanceService, HistoryService, TransferOrchestrator};
use crate::reconciliation::ReconciliationStats;
use crate::store::AccountStore;

/// Shared handles for request handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TransferOrchestrator>,
    pub balances: Arc<BalanceService>,
    pub access_guard: Arc<AccessGuard>,
    pub history: Arc<HistoryService>,
    pub accounts: Arc<dyn AccountStore>,
    pub audit: Arc<dyn AuditSink>,
    pub reconciliation: Arc<ReconciliationStats>,
}

impl AppState {
    pub fn new(
        orchestrator: TransferOrchestrator,
        accounts: Arc<dyn AccountStore>,
        audit: Arc<dyn AuditSink>,
        reconciliation: Arc<ReconciliationStats>,
    ) -> Self {
        Self {
            balances: orchestrator.balance_service(),
            access_guard: orchestrator.access_guard(),
            orchestrator: Arc::new(orchestrator),
            history: Arc::new(HistoryService::new(accounts.clone())),
            accounts,
            audit,
            reconciliation,
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Layers run outermost-last: logging -> security context -> handler
    let api_routes = create_router()
        .layer(axum::middleware::from_fn(
            middleware::security_context_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::logging_middleware));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        // Health check (no principal)
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
