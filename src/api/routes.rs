//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditRecord};
use crate::domain::{
    AccountType, ReferenceNumber, SecurityContext, Transaction, TransactionStatus, TransactionType,
};
use crate::error::AppError;
use crate::handlers::{BalanceSnapshot, SummaryPeriod, SummaryReport, TransferCommand};
use crate::reconciliation::StatsSnapshot;
use crate::store::TransactionFilter;

use super::{ApiResponse, AppState};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 100;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize)]
pub struct TransferReceipt {
    pub transaction_id: Uuid,
    pub reference_number: ReferenceNumber,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl From<&Transaction> for TransferReceipt {
    fn from(txn: &Transaction) -> Self {
        Self {
            transaction_id: txn.transaction_id,
            reference_number: txn.reference_number.clone(),
            status: txn.status,
            amount: txn.amount,
            timestamp: txn.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub account_id: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<Transaction>,
    pub pagination: Pagination,
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain end date
/// covers the whole day.
fn parse_date_bound(field: &str, raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, AppError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidRequest(format!("Invalid {field}: {raw}")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| AppError::Internal("invalid time of day".to_string()))?;

    Ok(date.and_time(time).and_utc())
}

impl HistoryQuery {
    fn into_filter(self, user_id: &str) -> Result<TransactionFilter, AppError> {
        let mut filter = TransactionFilter::for_user(user_id);

        filter.account_id = self.account_id.filter(|id| !id.trim().is_empty());
        filter.transaction_type = self
            .transaction_type
            .map(|raw| raw.parse::<TransactionType>().map_err(AppError::InvalidRequest))
            .transpose()?;
        filter.start = self
            .start_date
            .map(|raw| parse_date_bound("start_date", &raw, false))
            .transpose()?;
        filter.end = self
            .end_date
            .map(|raw| parse_date_bound("end_date", &raw, true))
            .transpose()?;
        filter.limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        filter.offset = self.offset.unwrap_or(0);

        Ok(filter)
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/accounts/:account_id/balance", get(get_balance))
        .route("/transfers", post(transfer))
        .route("/transactions", get(list_transactions))
        .route("/transactions/summary", get(transaction_summary))
        .route("/transactions/:transaction_id", get(get_transaction))
        .route("/reconciliation/status", get(reconciliation_status))
}

fn require_principal(ctx: &SecurityContext) -> Result<(), AppError> {
    if ctx.is_authenticated() {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

async fn record_audit(state: &AppState, record: AuditRecord) {
    let action = record.action;
    if let Err(e) = state.audit.record(record).await {
        tracing::warn!(action = %action, error = %e, "Failed to record audit entry");
    }
}

async fn ensure_access(state: &AppState, ctx: &SecurityContext, account_id: &str) -> Result<(), AppError> {
    if state.access_guard.authorize(&ctx.user_id, account_id).await {
        return Ok(());
    }

    record_audit(
        state,
        AuditRecord::new(AuditAction::AccessDenied, ctx).account(account_id),
    )
    .await;
    Err(AppError::AccessDenied(account_id.to_string()))
}

// =========================================================================
// GET /accounts
// =========================================================================

/// Accounts owned by the caller
async fn list_accounts(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
) -> Result<Json<ApiResponse<AccountsResponse>>, AppError> {
    require_principal(&ctx)?;

    let accounts: Vec<AccountSummary> = state
        .accounts
        .list_accounts(&ctx.user_id)
        .await?
        .into_iter()
        .map(|a| AccountSummary {
            account_id: a.account_id,
            account_type: a.account_type,
            balance: a.balance,
            currency: a.currency,
            is_active: a.is_active,
        })
        .collect();

    record_audit(
        &state,
        AuditRecord::new(AuditAction::GetAccounts, &ctx)
            .payload(&json!({ "account_count": accounts.len() })),
    )
    .await;

    Ok(Json(ApiResponse::success(
        "Accounts retrieved successfully",
        AccountsResponse { accounts },
    )))
}

// =========================================================================
// GET /accounts/:account_id/balance
// =========================================================================

/// Current balance of one account
async fn get_balance(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
    Path(account_id): Path<String>,
) -> Result<Json<ApiResponse<BalanceSnapshot>>, AppError> {
    require_principal(&ctx)?;
    ensure_access(&state, &ctx, &account_id).await?;

    let snapshot = state
        .balances
        .get_balance(&account_id)
        .await?
        .ok_or_else(|| AppError::AccountNotFound(account_id.clone()))?;

    record_audit(
        &state,
        AuditRecord::new(AuditAction::GetBalance, &ctx)
            .account(&account_id)
            .payload(&json!({ "source": snapshot.source })),
    )
    .await;

    Ok(Json(ApiResponse::success(
        "Balance retrieved successfully",
        snapshot,
    )))
}

// =========================================================================
// POST /transfers
// =========================================================================

/// Move funds between two accounts
async fn transfer(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
    payload: Result<Json<TransferCommand>, JsonRejection>,
) -> Result<Json<ApiResponse<TransferReceipt>>, AppError> {
    require_principal(&ctx)?;

    let Json(command) =
        payload.map_err(|e| AppError::InvalidRequest(format!("Invalid request body: {}", e.body_text())))?;

    let txn = state.orchestrator.transfer(&ctx, command).await?;

    Ok(Json(ApiResponse::success(
        "Transfer completed successfully",
        TransferReceipt::from(&txn),
    )))
}

// =========================================================================
// GET /transactions
// =========================================================================

/// Transactions initiated by the caller, newest first
async fn list_transactions(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<HistoryResponse>>, AppError> {
    require_principal(&ctx)?;

    let Query(query) =
        query.map_err(|e| AppError::InvalidRequest(format!("Invalid query: {}", e.body_text())))?;
    let filter = query.into_filter(&ctx.user_id)?;

    if let Some(account_id) = filter.account_id.as_deref() {
        ensure_access(&state, &ctx, account_id).await?;
    }

    let transactions = state.history.list(&filter).await?;

    record_audit(
        &state,
        AuditRecord::new(AuditAction::GetTransactions, &ctx).payload(&json!({
            "account_id": filter.account_id,
            "limit": filter.limit,
            "offset": filter.offset,
        })),
    )
    .await;

    let pagination = Pagination {
        limit: filter.limit,
        offset: filter.offset,
        count: transactions.len(),
    };

    Ok(Json(ApiResponse::success(
        "Transactions retrieved successfully",
        HistoryResponse {
            transactions,
            pagination,
        },
    )))
}

// =========================================================================
// GET /transactions/:transaction_id
// =========================================================================

/// One transaction initiated by the caller
async fn get_transaction(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
    Path(transaction_id): Path<String>,
) -> Result<Json<ApiResponse<Transaction>>, AppError> {
    require_principal(&ctx)?;

    // A malformed id cannot name any record
    let id = Uuid::parse_str(&transaction_id)
        .map_err(|_| AppError::TransactionNotFound(transaction_id.clone()))?;

    let txn = state
        .history
        .find(&ctx.user_id, id)
        .await?
        .ok_or_else(|| AppError::TransactionNotFound(transaction_id.clone()))?;

    record_audit(
        &state,
        AuditRecord::new(AuditAction::GetTransactionById, &ctx).transaction(txn.transaction_id),
    )
    .await;

    Ok(Json(ApiResponse::success(
        "Transaction retrieved successfully",
        txn,
    )))
}

// =========================================================================
// GET /transactions/summary
// =========================================================================

/// Totals of the caller's completed transactions over a recent period
async fn transaction_summary(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
    query: Result<Query<SummaryQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<SummaryReport>>, AppError> {
    require_principal(&ctx)?;

    let Query(query) =
        query.map_err(|e| AppError::InvalidRequest(format!("Invalid query: {}", e.body_text())))?;
    let account_id = query.account_id.filter(|id| !id.trim().is_empty());
    let period = SummaryPeriod::parse(query.period.as_deref());

    if let Some(account_id) = account_id.as_deref() {
        ensure_access(&state, &ctx, account_id).await?;
    }

    let report = state
        .history
        .summarize(&ctx.user_id, account_id.clone(), period, Utc::now())
        .await?;

    record_audit(
        &state,
        AuditRecord::new(AuditAction::GetTransactionSummary, &ctx).payload(&json!({
            "account_id": account_id,
            "period": period,
            "total_transactions": report.summary.total_transactions,
        })),
    )
    .await;

    Ok(Json(ApiResponse::success(
        "Transaction summary retrieved successfully",
        report,
    )))
}

// =========================================================================
// GET /reconciliation/status
// =========================================================================

/// Reconciliation counters
async fn reconciliation_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
) -> Result<Json<ApiResponse<StatsSnapshot>>, AppError> {
    require_principal(&ctx)?;

    Ok(Json(ApiResponse::success(
        "Reconciliation status",
        state.reconciliation.snapshot(),
    )))
}
