//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::task::JoinHandle;
use tower::util::ServiceExt;

use bank_core::api::{self, AppState};
use bank_core::audit::MemoryAuditSink;
use bank_core::domain::{Account, AccountType};
use bank_core::handlers::TransferOrchestrator;
use bank_core::notify::MemoryNotifier;
use bank_core::reconciliation::{self, Backoff, ReconciliationWorker};
use bank_core::store::{MemoryAccountStore, MemoryLedgerStore};

/// Full application over in-memory stores
pub struct TestApp {
    pub router: Router,
    pub cache: Arc<MemoryAccountStore>,
    pub ledger: Arc<MemoryLedgerStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub notifier: Arc<MemoryNotifier>,
    pub worker: JoinHandle<()>,
}

pub fn account(id: &str, owner: &str, balance: Decimal) -> Account {
    Account::open(id, owner, AccountType::Checking, balance, "USD")
}

/// Seed both tiers with `accounts` and start a reconciliation worker
pub fn setup_app(accounts: Vec<Account>) -> TestApp {
    setup_tiers(accounts.clone(), accounts)
}

/// Like [`setup_app`] but with different contents per tier
pub fn setup_tiers(cached: Vec<Account>, ledgered: Vec<Account>) -> TestApp {
    let cache = Arc::new(MemoryAccountStore::with_accounts(cached));
    let ledger = Arc::new(MemoryLedgerStore::with_accounts(ledgered));
    let audit = Arc::new(MemoryAuditSink::new());
    let notifier = Arc::new(MemoryNotifier::new());

    let (queue, receiver) = reconciliation::channel(64);
    let stats = queue.stats();
    let backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
    let worker = ReconciliationWorker::new(ledger.clone(), receiver, backoff).start();

    let orchestrator = TransferOrchestrator::new(
        cache.clone(),
        ledger.clone(),
        Arc::new(queue),
        notifier.clone(),
        audit.clone(),
    );

    let state = AppState::new(orchestrator, cache.clone(), audit.clone(), stats);

    TestApp {
        router: api::build_router(state),
        cache,
        ledger,
        audit,
        notifier,
        worker,
    }
}

/// The rent scenario: alice owns ACC-A (500), bob owns ACC-B (100)
pub fn setup_default_app() -> TestApp {
    setup_app(vec![
        account("ACC-A", "alice", Decimal::new(50000, 2)),
        account("ACC-B", "bob", Decimal::new(10000, 2)),
    ])
}

pub fn get(uri: &str, user_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("X-User-Id", user_id);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, user_id: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-User-Id", user_id)
        .header("X-Session-Id", "sess-test")
        .header("X-Forwarded-For", "203.0.113.9")
        .header("User-Agent", "bank-app-tests/1.0")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Send `request` and return the status plus the decoded JSON body
pub async fn send(router: &Router, request: Request<Body>) -> (axum::http::StatusCode, Value) {
    let response: Response<Body> = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Parse a serialized decimal field
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}
