//! In-process store implementations
//!
//! `MemoryAccountStore` is the process-wide cache tier. `MemoryLedgerStore`
//! stands in for the durable ledger in tests and local runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Account, Transaction, TransactionStatus};

use super::{AccountStore, ApplyOutcome, LedgerStore, StoreError, StoreResult, TransactionFilter};

// =========================================================================
// Cache tier
// =========================================================================

/// Concurrent cache of accounts and transaction records.
///
/// Each balance update locks only the shard holding that account, so
/// concurrent transfers touching different accounts never contend.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, Account>,
    transactions: DashMap<Uuid, Transaction>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `accounts`
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.accounts.insert(account.account_id.clone(), account);
        }
        store
    }

    /// Number of cached accounts
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_account(&self, account_id: &str) -> StoreResult<Option<Account>> {
        Ok(self.accounts.get(account_id).map(|entry| entry.value().clone()))
    }

    async fn put_account(&self, account: Account) -> StoreResult<()> {
        self.accounts.insert(account.account_id.clone(), account);
        Ok(())
    }

    async fn seed_account(&self, account: Account) -> StoreResult<bool> {
        match self.accounts.entry(account.account_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(account);
                Ok(true)
            }
        }
    }

    async fn list_accounts(&self, owner_id: &str) -> StoreResult<Vec<Account>> {
        let mut owned: Vec<Account> = self
            .accounts
            .iter()
            .filter(|entry| entry.value().is_owned_by(owner_id))
            .map(|entry| entry.value().clone())
            .collect();

        owned.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(owned)
    }

    async fn adjust_balance(&self, account_id: &str, delta: Decimal) -> StoreResult<Decimal> {
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::AccountNotFound(account_id.to_string()))?;

        entry.balance += delta;
        entry.updated_at = Utc::now();

        tracing::debug!(
            account_id = %account_id,
            delta = %delta,
            balance = %entry.balance,
            "Cache balance adjusted"
        );

        Ok(entry.balance)
    }

    async fn put_transaction(&self, txn: &Transaction) -> StoreResult<()> {
        self.transactions.insert(txn.transaction_id, txn.clone());
        Ok(())
    }

    async fn set_transaction_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
        failure_reason: Option<String>,
    ) -> StoreResult<()> {
        let mut entry = self
            .transactions
            .get_mut(&transaction_id)
            .ok_or(StoreError::TransactionNotFound(transaction_id))?;

        entry.status = status;
        entry.updated_at = Utc::now();
        if failure_reason.is_some() {
            entry.metadata.failure_reason = failure_reason;
        }
        Ok(())
    }

    async fn get_transaction(&self, transaction_id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self
            .transactions
            .get(&transaction_id)
            .map(|entry| entry.value().clone()))
    }

    async fn list_transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>> {
        let mut matching: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }
}

// =========================================================================
// Ledger stand-in
// =========================================================================

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<String, Account>,
    transactions: HashMap<Uuid, Transaction>,
}

/// In-memory ledger with the same idempotent-apply contract as the
/// PostgreSQL ledger. Row insert and balance updates happen under one lock.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger pre-populated with `accounts`
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let state = LedgerState {
            accounts: accounts
                .into_iter()
                .map(|account| (account.account_id.clone(), account))
                .collect(),
            transactions: HashMap::new(),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Number of reconciled transaction rows
    pub fn transaction_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.transactions.len())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_account(&self, account_id: &str) -> StoreResult<Option<Account>> {
        Ok(self.lock()?.accounts.get(account_id).cloned())
    }

    async fn list_active_accounts(&self) -> StoreResult<Vec<Account>> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .filter(|account| account.is_active)
            .cloned()
            .collect())
    }

    async fn get_transaction(&self, transaction_id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self.lock()?.transactions.get(&transaction_id).cloned())
    }

    async fn apply_transaction(&self, txn: &Transaction) -> StoreResult<ApplyOutcome> {
        let mut state = self.lock()?;

        if state.transactions.contains_key(&txn.transaction_id) {
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let deltas = if txn.status == TransactionStatus::Completed {
            txn.balance_deltas()
        } else {
            Vec::new()
        };

        // Validate every leg before touching anything.
        for (account_id, _) in &deltas {
            if !state.accounts.contains_key(*account_id) {
                return Err(StoreError::AccountNotFound(account_id.to_string()));
            }
        }

        let now = Utc::now();
        for (account_id, delta) in deltas {
            if let Some(account) = state.accounts.get_mut(account_id) {
                account.balance += delta;
                account.updated_at = now;
            }
        }
        state.transactions.insert(txn.transaction_id, txn.clone());

        Ok(ApplyOutcome::Applied)
    }
}
