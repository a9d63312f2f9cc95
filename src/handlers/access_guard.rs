//! Access Guard
//!
//! Decides whether a principal may act on an account.

use std::sync::Arc;

use crate::domain::Account;
use crate::store::{AccountStore, LedgerStore};

/// Ownership check against the cache tier, falling back to the ledger
pub struct AccessGuard {
    cache: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl AccessGuard {
    pub fn new(cache: Arc<dyn AccountStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { cache, ledger }
    }

    /// Whether `user_id` owns the active account `account_id`.
    ///
    /// Lookup failures deny access; this never returns an error.
    pub async fn authorize(&self, user_id: &str, account_id: &str) -> bool {
        if user_id.trim().is_empty() {
            return false;
        }

        match self.lookup(account_id).await {
            Some(account) => account.is_active && account.is_owned_by(user_id),
            None => false,
        }
    }

    async fn lookup(&self, account_id: &str) -> Option<Account> {
        match self.cache.get_account(account_id).await {
            Ok(Some(account)) => return Some(account),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    error = %e,
                    "Cache lookup failed during access check, using ledger"
                );
            }
        }

        match self.ledger.get_account(account_id).await {
            Ok(account) => account,
            Err(e) => {
                tracing::error!(
                    account_id = %account_id,
                    error = %e,
                    "Ledger lookup failed during access check, denying"
                );
                None
            }
        }
    }
}
