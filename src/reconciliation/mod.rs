//! Reconciliation
//!
//! Propagates cache-committed transactions into the ledger. The transfer path
//! enqueues without waiting; a single worker drains the queue and applies
//! each record with [`LedgerStore::apply_transaction`], retrying until it
//! sticks. Delivery is at-least-once, so the apply must be idempotent.
//!
//! [`LedgerStore::apply_transaction`]: crate::store::LedgerStore::apply_transaction

mod queue;
mod worker;

pub use queue::{channel, ChannelQueue, QueueReceiver};
pub use worker::{Backoff, ReconciliationWorker};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::Transaction;

/// Queue error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Reconciliation queue is full")]
    Full,

    #[error("Reconciliation queue is closed")]
    Closed,
}

/// Hand-off point between the transfer path and the ledger consumer
#[async_trait]
pub trait ReconciliationQueue: Send + Sync {
    /// Queue `txn` for ledger application. Never waits for capacity.
    async fn enqueue(&self, txn: Transaction) -> Result<(), QueueError>;
}

// =========================================================================
// Stats
// =========================================================================

/// Counters describing the cache/ledger divergence window
#[derive(Debug, Default)]
pub struct ReconciliationStats {
    enqueued: AtomicU64,
    applied: AtomicU64,
    duplicates: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time view of [`ReconciliationStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub retries: u64,
    /// Enqueued records not yet settled in the ledger
    pub backlog: u64,
}

impl ReconciliationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let enqueued = self.enqueued.load(Ordering::Relaxed);
        let applied = self.applied.load(Ordering::Relaxed);
        let duplicates = self.duplicates.load(Ordering::Relaxed);

        StatsSnapshot {
            enqueued,
            applied,
            duplicates,
            retries: self.retries.load(Ordering::Relaxed),
            backlog: enqueued.saturating_sub(applied + duplicates),
        }
    }
}
