//! Ledger consumer

use std::sync::Arc;
use std::time::Duration;

use crate::config::ReconciliationSettings;
use crate::domain::Transaction;
use crate::store::{ApplyOutcome, LedgerStore};

use super::{QueueReceiver, ReconciliationStats};

/// Exponential retry delay: `base * 2^attempt`, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl From<ReconciliationSettings> for Backoff {
    fn from(settings: ReconciliationSettings) -> Self {
        Self::new(settings.backoff_base, settings.backoff_max)
    }
}

/// Drains the reconciliation queue into the ledger
pub struct ReconciliationWorker {
    ledger: Arc<dyn LedgerStore>,
    receiver: QueueReceiver,
    stats: Arc<ReconciliationStats>,
    backoff: Backoff,
}

impl ReconciliationWorker {
    pub fn new(ledger: Arc<dyn LedgerStore>, receiver: QueueReceiver, backoff: Backoff) -> Self {
        let stats = receiver.stats();
        Self {
            ledger,
            receiver,
            stats,
            backoff,
        }
    }

    /// Start the worker in the background.
    ///
    /// The task finishes once every queue handle is dropped and the buffer
    /// has been drained.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        tracing::info!("Reconciliation worker started");

        while let Some(txn) = self.receiver.recv().await {
            self.apply_with_retry(&txn).await;
        }

        tracing::info!(
            applied = self.stats.snapshot().applied,
            "Reconciliation queue closed, worker stopped"
        );
    }

    /// Apply `txn` to the ledger, retrying until the ledger accepts it
    pub async fn apply_with_retry(&self, txn: &Transaction) -> ApplyOutcome {
        let mut attempt: u32 = 0;

        loop {
            match self.ledger.apply_transaction(txn).await {
                Ok(ApplyOutcome::Applied) => {
                    self.stats.record_applied();
                    tracing::debug!(
                        transaction_id = %txn.transaction_id,
                        reference_number = %txn.reference_number,
                        attempts = attempt + 1,
                        "Transaction reconciled"
                    );
                    return ApplyOutcome::Applied;
                }
                Ok(ApplyOutcome::AlreadyApplied) => {
                    self.stats.record_duplicate();
                    tracing::info!(
                        transaction_id = %txn.transaction_id,
                        reference_number = %txn.reference_number,
                        "Duplicate delivery ignored"
                    );
                    return ApplyOutcome::AlreadyApplied;
                }
                Err(e) => {
                    let delay = self.backoff.delay(attempt);
                    self.stats.record_retry();
                    tracing::warn!(
                        transaction_id = %txn.transaction_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Ledger apply failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}
