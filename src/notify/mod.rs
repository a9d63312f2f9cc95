//! Account-holder notifications
//!
//! Delivery is best-effort; a failed notification never fails a transfer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::domain::Transaction;

/// What happened to the notified account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TransferDebit,
    TransferCredit,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TransferDebit => "transfer_debit",
            NotificationKind::TransferCredit => "transfer_credit",
        }
    }
}

/// A single account-holder notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub account_id: String,
    pub kind: NotificationKind,
    pub amount: Decimal,
    pub reference_number: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Debit and credit notifications for a completed transfer
    pub fn for_transfer(txn: &Transaction) -> Vec<Notification> {
        let legs = [
            (txn.from_account_id.as_deref(), NotificationKind::TransferDebit),
            (txn.to_account_id.as_deref(), NotificationKind::TransferCredit),
        ];

        legs.into_iter()
            .filter_map(|(account, kind)| {
                account.map(|account_id| Notification {
                    account_id: account_id.to_string(),
                    kind,
                    amount: txn.amount,
                    reference_number: txn.reference_number.to_string(),
                    description: txn.description.clone(),
                    timestamp: txn.updated_at,
                })
            })
            .collect()
    }
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Emits notifications as structured tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            event = notification.kind.as_str(),
            account_id = %notification.account_id,
            amount = %notification.amount,
            reference_number = %notification.reference_number,
            description = %notification.description,
            timestamp = %notification.timestamp,
            "Account notification"
        );
        Ok(())
    }
}

/// Records notifications in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("notifier disabled".to_string()));
        }

        self.sent
            .lock()
            .map_err(|_| NotifyError::Unavailable("outbox poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}
