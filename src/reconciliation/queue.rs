//! Bounded in-process queue

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::domain::Transaction;

use super::{QueueError, ReconciliationQueue, ReconciliationStats};

/// Create a bounded queue and its consuming end.
///
/// Both halves share one [`ReconciliationStats`].
pub fn channel(capacity: usize) -> (ChannelQueue, QueueReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(ReconciliationStats::new());

    (
        ChannelQueue {
            sender,
            stats: Arc::clone(&stats),
        },
        QueueReceiver { receiver, stats },
    )
}

/// Producer half; cheap to clone
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    sender: mpsc::Sender<Transaction>,
    stats: Arc<ReconciliationStats>,
}

impl ChannelQueue {
    pub fn stats(&self) -> Arc<ReconciliationStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl ReconciliationQueue for ChannelQueue {
    async fn enqueue(&self, txn: Transaction) -> Result<(), QueueError> {
        self.sender.try_send(txn).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })?;
        self.stats.record_enqueued();
        Ok(())
    }
}

/// Consumer half
#[derive(Debug)]
pub struct QueueReceiver {
    receiver: mpsc::Receiver<Transaction>,
    stats: Arc<ReconciliationStats>,
}

impl QueueReceiver {
    /// Next record; `None` once every producer is gone and the buffer is empty
    pub async fn recv(&mut self) -> Option<Transaction> {
        self.receiver.recv().await
    }

    pub fn stats(&self) -> Arc<ReconciliationStats> {
        Arc::clone(&self.stats)
    }
}
