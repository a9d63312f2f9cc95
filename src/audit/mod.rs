//! Audit Log Service
//!
//! Records every state-changing and sensitive read operation. Recording is
//! best-effort: callers log a failed write and carry on.

mod postgres;

pub use postgres::{ChainVerificationResult, PgAuditSink};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::SecurityContext;

// =========================================================================
// Audit actions
// =========================================================================

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    TransferSuccess,
    TransferFailed,
    /// Balance read performed while validating a transfer
    BalanceCheck,
    GetBalance,
    #[serde(rename = "GET_ALL_ACCOUNTS")]
    GetAccounts,
    GetTransactions,
    GetTransactionById,
    GetTransactionSummary,
    AccessDenied,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::TransferSuccess => "TRANSFER_SUCCESS",
            AuditAction::TransferFailed => "TRANSFER_FAILED",
            AuditAction::BalanceCheck => "BALANCE_CHECK",
            AuditAction::GetBalance => "GET_BALANCE",
            AuditAction::GetAccounts => "GET_ALL_ACCOUNTS",
            AuditAction::GetTransactions => "GET_TRANSACTIONS",
            AuditAction::GetTransactionById => "GET_TRANSACTION_BY_ID",
            AuditAction::GetTransactionSummary => "GET_TRANSACTION_SUMMARY",
            AuditAction::AccessDenied => "ACCESS_DENIED",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =========================================================================
// Audit records
// =========================================================================

/// One audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub user_id: String,
    pub action: AuditAction,
    pub account_id: Option<String>,
    pub ip_address: String,
    pub session_id: String,
    pub user_agent: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Start a record for `action` performed by the principal in `ctx`
    pub fn new(action: AuditAction, ctx: &SecurityContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id: None,
            user_id: ctx.user_id.clone(),
            action,
            account_id: None,
            ip_address: ctx.ip_address.clone(),
            session_id: ctx.session_id.clone(),
            user_agent: ctx.user_agent.clone(),
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Set the transaction this entry refers to
    pub fn transaction(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// Set the account this entry refers to
    pub fn account(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }

    /// Attach a structured payload
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        self
    }
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditLogError>;
}

// =========================================================================
// In-process sink
// =========================================================================

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    fail: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every write fails
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    /// Snapshot of recorded entries, oldest first
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Recorded actions, oldest first
    pub fn actions(&self) -> Vec<AuditAction> {
        self.records().into_iter().map(|r| r.action).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditLogError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuditLogError::Unavailable("sink disabled".to_string()));
        }

        self.records
            .lock()
            .map_err(|_| AuditLogError::Unavailable("audit buffer poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}

/// Calculate SHA-256 hash and return as hex string
pub(crate) fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

// =========================================================================
// Tests
// =========================================================================
