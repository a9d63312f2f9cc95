//! Transaction records
//!
//! A transaction is written once into the cache tier when a transfer commits
//! and once into the ledger at reconciliation time. Both writes carry the same
//! `transaction_id` and `reference_number`.

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Amount, SecurityContext};

/// Kind of money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    Payment,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Transfer => "transfer",
            TransactionType::Payment => "payment",
            TransactionType::Refund => "refund",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "transfer" => Ok(TransactionType::Transfer),
            "payment" => Ok(TransactionType::Payment),
            "refund" => Ok(TransactionType::Refund),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled records never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

// =========================================================================
// Reference number
// =========================================================================

const REFERENCE_PREFIX: &str = "TXN";
const REFERENCE_SUFFIX_LEN: usize = 8;

/// Human-facing correlation id: `TXN-<YYYYMMDD>-<8 uppercase hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceNumber(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid reference number: {0}")]
pub struct ReferenceNumberError(String);

impl ReferenceNumber {
    /// Mint a new reference number for `date`.
    pub fn generate(date: NaiveDate) -> Self {
        let suffix: [u8; REFERENCE_SUFFIX_LEN / 2] = rand::thread_rng().gen();
        Self(format!(
            "{}-{}-{}",
            REFERENCE_PREFIX,
            date.format("%Y%m%d"),
            hex::encode_upper(suffix)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReferenceNumber {
    type Err = ReferenceNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ReferenceNumberError(s.to_string());
        let mut parts = s.splitn(3, '-');

        if parts.next() != Some(REFERENCE_PREFIX) {
            return Err(invalid());
        }
        let date = parts.next().ok_or_else(invalid)?;
        NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;

        let suffix = parts.next().ok_or_else(invalid)?;
        let suffix_ok = suffix.len() == REFERENCE_SUFFIX_LEN
            && suffix
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c));
        if !suffix_ok {
            return Err(invalid());
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ReferenceNumber {
    type Error = ReferenceNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReferenceNumber> for String {
    fn from(reference: ReferenceNumber) -> Self {
        reference.0
    }
}

// =========================================================================
// Transaction
// =========================================================================

/// Who initiated a transaction and from where.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub initiated_by: String,
    pub session_id: String,
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl TransactionMetadata {
    pub fn from_context(context: &SecurityContext) -> Self {
        Self {
            initiated_by: context.user_id.clone(),
            session_id: context.session_id.clone(),
            ip_address: context.ip_address.clone(),
            failure_reason: None,
        }
    }
}

/// A money movement between at most two accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub from_account_id: Option<String>,
    pub to_account_id: Option<String>,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: String,
    pub reference_number: ReferenceNumber,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: TransactionMetadata,
}

impl Transaction {
    /// Build a pending transfer record with a freshly minted id and reference.
    pub fn new_transfer(
        from_account_id: &str,
        to_account_id: &str,
        amount: Amount,
        description: &str,
        context: &SecurityContext,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: Uuid::new_v4(),
            from_account_id: Some(from_account_id.to_string()),
            to_account_id: Some(to_account_id.to_string()),
            amount: amount.value(),
            transaction_type: TransactionType::Transfer,
            status: TransactionStatus::Pending,
            description: description.to_string(),
            reference_number: ReferenceNumber::generate(now.date_naive()),
            created_at: now,
            updated_at: now,
            metadata: TransactionMetadata::from_context(context),
        }
    }

    /// Return a copy moved to `status`.
    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self.updated_at = Utc::now();
        self
    }

    /// Return a failed copy carrying `reason` for operators.
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.metadata.failure_reason = Some(reason.into());
        self.with_status(TransactionStatus::Failed)
    }

    /// Balance deltas this transaction implies, as `(account_id, delta)`.
    ///
    /// For a transfer the deltas sum to zero.
    pub fn balance_deltas(&self) -> Vec<(&str, Decimal)> {
        let mut deltas = Vec::with_capacity(2);
        if let Some(from) = self.from_account_id.as_deref() {
            deltas.push((from, -self.amount));
        }
        if let Some(to) = self.to_account_id.as_deref() {
            deltas.push((to, self.amount));
        }
        deltas
    }

    /// Whether either side of the transaction is `account_id`.
    pub fn touches(&self, account_id: &str) -> bool {
        self.from_account_id.as_deref() == Some(account_id)
            || self.to_account_id.as_deref() == Some(account_id)
    }
}
