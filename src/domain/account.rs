//! Account
//!
//! Current-balance view of a bank account as held by both store tiers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account product type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Savings,
    Business,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
            AccountType::Business => "business",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(AccountType::Checking),
            "savings" => Ok(AccountType::Savings),
            "business" => Ok(AccountType::Business),
            other => Err(format!("unknown account type: {other}")),
        }
    }
}

/// A bank account.
///
/// Owned by exactly one principal. Accounts are opened elsewhere and are
/// never deleted here, only deactivated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub owner_id: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create an active account with the given opening balance.
    pub fn open(
        account_id: impl Into<String>,
        owner_id: impl Into<String>,
        account_type: AccountType,
        balance: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            owner_id: owner_id.into(),
            account_type,
            balance,
            currency: currency.into(),
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    /// Mark the account inactive.
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self.updated_at = Utc::now();
        self
    }

    /// Whether `user_id` owns this account.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        !user_id.is_empty() && self.owner_id == user_id
    }
}
