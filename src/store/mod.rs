//! Store tiers
//!
//! Two stores hold balances:
//! - [`AccountStore`]: low-latency cache tier, source of fast reads, not
//!   authoritative. Balance updates are additive and commute.
//! - [`LedgerStore`]: durable system of record, written only by the
//!   reconciliation worker through an idempotent apply.
//!
//! Both are process-wide, constructed once and shared behind `Arc`.

mod memory;
mod postgres;

pub use memory::{MemoryAccountStore, MemoryLedgerStore};
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Account, Transaction, TransactionStatus, TransactionType};

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of applying a transaction to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Row written and balances updated
    Applied,
    /// A row with this transaction id already exists; nothing changed
    AlreadyApplied,
}

/// Filter for transaction history queries
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    /// Principal that initiated the transactions
    pub initiated_by: String,
    pub account_id: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl TransactionFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            initiated_by: user_id.into(),
            account_id: None,
            transaction_type: None,
            start: None,
            end: None,
            limit: 50,
            offset: 0,
        }
    }

    /// Whether `txn` passes every predicate (ignores paging)
    pub fn matches(&self, txn: &Transaction) -> bool {
        txn.metadata.initiated_by == self.initiated_by
            && self.account_id.as_deref().map_or(true, |id| txn.touches(id))
            && self.transaction_type.map_or(true, |ty| txn.transaction_type == ty)
            && self.start.map_or(true, |start| txn.created_at >= start)
            && self.end.map_or(true, |end| txn.created_at <= end)
    }
}

/// Cache-tier store for current balances and transaction records.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Get an account by id
    async fn get_account(&self, account_id: &str) -> StoreResult<Option<Account>>;

    /// Insert or replace an account
    async fn put_account(&self, account: Account) -> StoreResult<()>;

    /// Insert `account` only if nothing is cached under its id.
    ///
    /// Returns whether the account was inserted. An existing entry, and any
    /// balance updates already applied to it, is left untouched.
    async fn seed_account(&self, account: Account) -> StoreResult<bool>;

    /// Accounts owned by `owner_id`, ordered by account id
    async fn list_accounts(&self, owner_id: &str) -> StoreResult<Vec<Account>>;

    /// Add `delta` to the balance and return the new balance.
    ///
    /// Fails with `AccountNotFound` if the account is not cached. No lower
    /// bound is enforced here.
    async fn adjust_balance(&self, account_id: &str, delta: Decimal) -> StoreResult<Decimal>;

    /// Insert a transaction record
    async fn put_transaction(&self, txn: &Transaction) -> StoreResult<()>;

    /// Move a stored transaction to `status`
    async fn set_transaction_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
        failure_reason: Option<String>,
    ) -> StoreResult<()>;

    /// Get a transaction record by id
    async fn get_transaction(&self, transaction_id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Newest-first transaction history
    async fn list_transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>>;
}

/// Durable system of record.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Get an account by id
    async fn get_account(&self, account_id: &str) -> StoreResult<Option<Account>>;

    /// All active accounts (cache warm-up)
    async fn list_active_accounts(&self) -> StoreResult<Vec<Account>>;

    /// Get a reconciled transaction by id
    async fn get_transaction(&self, transaction_id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Idempotently record `txn`, keyed by `transaction_id`.
    ///
    /// Balance deltas are applied only when the row is newly written, in the
    /// same atomic unit as the row. Replaying a record is a no-op.
    async fn apply_transaction(&self, txn: &Transaction) -> StoreResult<ApplyOutcome>;
}
