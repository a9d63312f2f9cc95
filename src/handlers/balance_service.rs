//! Balance Service
//!
//! Read path for balances: cache first, ledger on miss. The ledger result is
//! never written back to the cache.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{Account, AccountType};
use crate::store::{AccountStore, LedgerStore, StoreError};

/// Tier that answered a balance read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    Cache,
    Ledger,
}

/// Balance as seen by one read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub account_id: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
    pub source: BalanceSource,
}

impl BalanceSnapshot {
    fn from_account(account: Account, source: BalanceSource) -> Self {
        Self {
            account_id: account.account_id,
            account_type: account.account_type,
            balance: account.balance,
            currency: account.currency,
            last_updated: account.updated_at,
            source,
        }
    }
}

pub struct BalanceService {
    cache: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl BalanceService {
    pub fn new(cache: Arc<dyn AccountStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { cache, ledger }
    }

    /// Current balance of `account_id`, or `None` when neither tier has it.
    ///
    /// A cache failure is treated as a miss; a ledger failure is an error.
    pub async fn get_balance(&self, account_id: &str) -> Result<Option<BalanceSnapshot>, StoreError> {
        match self.cache.get_account(account_id).await {
            Ok(Some(account)) => {
                return Ok(Some(BalanceSnapshot::from_account(account, BalanceSource::Cache)));
            }
            Ok(None) => {
                tracing::debug!(account_id = %account_id, "Balance cache miss");
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    error = %e,
                    "Balance cache read failed, using ledger"
                );
            }
        }

        let account = self.ledger.get_account(account_id).await?;
        Ok(account.map(|a| BalanceSnapshot::from_account(a, BalanceSource::Ledger)))
    }
}
