//! Transaction history reads
//!
//! Single-record lookup and period summaries over the cache tier. Records
//! are only ever visible to the principal that initiated them.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus, TransactionType};
use crate::store::{AccountStore, StoreResult, TransactionFilter};

/// Most records a summary aggregates
pub const SUMMARY_SCAN_LIMIT: usize = 1000;

// =========================================================================
// Summary types
// =========================================================================

/// Look-back window of a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryPeriod {
    Day,
    Week,
    Month,
    Year,
}

impl SummaryPeriod {
    /// Unknown or missing names fall back to a month
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("day") => SummaryPeriod::Day,
            Some("week") => SummaryPeriod::Week,
            Some("year") => SummaryPeriod::Year,
            _ => SummaryPeriod::Month,
        }
    }

    pub fn length(&self) -> Duration {
        match self {
            SummaryPeriod::Day => Duration::days(1),
            SummaryPeriod::Week => Duration::weeks(1),
            SummaryPeriod::Month => Duration::days(30),
            SummaryPeriod::Year => Duration::days(365),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub period: SummaryPeriod,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Count and total of one kind of movement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub count: usize,
    pub amount: Decimal,
}

impl Bucket {
    fn add(&mut self, amount: Decimal) {
        self.count += 1;
        self.amount += amount;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub total_transactions: usize,
    pub total_amount: Decimal,
    pub deposits: Bucket,
    pub withdrawals: Bucket,
    pub transfers_out: Bucket,
    pub transfers_in: Bucket,
}

impl TransactionSummary {
    /// Aggregate completed transactions.
    ///
    /// Transfer direction is relative to `account_id`; without one, transfers
    /// count toward the totals only.
    pub fn from_transactions<'a>(
        transactions: impl IntoIterator<Item = &'a Transaction>,
        account_id: Option<&str>,
    ) -> Self {
        let mut summary = Self::default();

        for txn in transactions {
            if txn.status != TransactionStatus::Completed {
                continue;
            }

            summary.total_transactions += 1;
            summary.total_amount += txn.amount;

            match txn.transaction_type {
                TransactionType::Deposit => summary.deposits.add(txn.amount),
                TransactionType::Withdrawal => summary.withdrawals.add(txn.amount),
                TransactionType::Transfer => {
                    let Some(account_id) = account_id else { continue };
                    if txn.from_account_id.as_deref() == Some(account_id) {
                        summary.transfers_out.add(txn.amount);
                    } else if txn.to_account_id.as_deref() == Some(account_id) {
                        summary.transfers_in.add(txn.amount);
                    }
                }
                TransactionType::Payment | TransactionType::Refund => {}
            }
        }

        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub period: PeriodWindow,
    pub summary: TransactionSummary,
}

// =========================================================================
// HistoryService
// =========================================================================

/// Read side of the transaction history
pub struct HistoryService {
    cache: Arc<dyn AccountStore>,
}

impl HistoryService {
    pub fn new(cache: Arc<dyn AccountStore>) -> Self {
        Self { cache }
    }

    /// Newest-first page matching `filter`
    pub async fn list(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>> {
        self.cache.list_transactions(filter).await
    }

    /// A transaction initiated by `user_id`.
    ///
    /// Someone else's record is reported as absent.
    pub async fn find(&self, user_id: &str, transaction_id: Uuid) -> StoreResult<Option<Transaction>> {
        let txn = self.cache.get_transaction(transaction_id).await?;
        Ok(txn.filter(|t| t.metadata.initiated_by == user_id))
    }

    /// Summary of the caller's transactions over the `period` ending at `now`
    pub async fn summarize(
        &self,
        user_id: &str,
        account_id: Option<String>,
        period: SummaryPeriod,
        now: DateTime<Utc>,
    ) -> StoreResult<SummaryReport> {
        let window = PeriodWindow {
            period,
            start_date: now - period.length(),
            end_date: now,
        };

        let mut filter = TransactionFilter::for_user(user_id);
        filter.account_id = account_id;
        filter.start = Some(window.start_date);
        filter.end = Some(window.end_date);
        filter.limit = SUMMARY_SCAN_LIMIT;

        let transactions = self.cache.list_transactions(&filter).await?;

        tracing::debug!(
            user_id = %user_id,
            scanned = transactions.len(),
            "Transaction summary computed"
        );

        Ok(SummaryReport {
            summary: TransactionSummary::from_transactions(&transactions, filter.account_id.as_deref()),
            period: window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, SecurityContext};
    use crate::store::MemoryAccountStore;
    use rust_decimal_macros::dec;

    fn transfer(user: &str, from: &str, to: &str, amount: Decimal) -> Transaction {
        Transaction::new_transfer(
            from,
            to,
            Amount::new(amount).unwrap(),
            "test",
            &SecurityContext::new(user),
        )
        .with_status(TransactionStatus::Completed)
    }

    fn of_type(txn: Transaction, ty: TransactionType) -> Transaction {
        Transaction {
            transaction_type: ty,
            ..txn
        }
    }

    #[test]
    fn test_period_parse_defaults_to_month() {
        assert_eq!(SummaryPeriod::parse(Some("day")), SummaryPeriod::Day);
        assert_eq!(SummaryPeriod::parse(Some("year")), SummaryPeriod::Year);
        assert_eq!(SummaryPeriod::parse(Some("fortnight")), SummaryPeriod::Month);
        assert_eq!(SummaryPeriod::parse(None), SummaryPeriod::Month);
        assert_eq!(SummaryPeriod::Week.length(), Duration::days(7));
    }

    #[test]
    fn test_summary_buckets() {
        let txns = vec![
            transfer("alice", "A", "B", dec!(200)),
            transfer("alice", "A", "C", dec!(50)),
            transfer("alice", "C", "A", dec!(20)),
            of_type(transfer("alice", "X", "A", dec!(5)), TransactionType::Deposit),
            of_type(transfer("alice", "A", "X", dec!(7)), TransactionType::Withdrawal),
            transfer("alice", "A", "B", dec!(999)).failed("leg failed"),
        ];

        let summary = TransactionSummary::from_transactions(&txns, Some("A"));

        assert_eq!(summary.total_transactions, 5);
        assert_eq!(summary.total_amount, dec!(282));
        assert_eq!(summary.transfers_out, Bucket { count: 2, amount: dec!(250) });
        assert_eq!(summary.transfers_in, Bucket { count: 1, amount: dec!(20) });
        assert_eq!(summary.deposits, Bucket { count: 1, amount: dec!(5) });
        assert_eq!(summary.withdrawals, Bucket { count: 1, amount: dec!(7) });

        let unscoped = TransactionSummary::from_transactions(&txns, None);
        assert_eq!(unscoped.total_transactions, 5);
        assert_eq!(unscoped.transfers_out.count, 0);
        assert_eq!(unscoped.transfers_in.count, 0);
    }

    #[tokio::test]
    async fn test_find_is_scoped_to_initiator() {
        let cache = Arc::new(MemoryAccountStore::new());
        let txn = transfer("alice", "A", "B", dec!(10));
        cache.put_transaction(&txn).await.unwrap();
        let history = HistoryService::new(cache);

        let found = history.find("alice", txn.transaction_id).await.unwrap();
        assert_eq!(found.map(|t| t.transaction_id), Some(txn.transaction_id));

        assert!(history.find("bob", txn.transaction_id).await.unwrap().is_none());
        assert!(history.find("alice", Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_summarize_applies_window_and_owner() {
        let cache = Arc::new(MemoryAccountStore::new());
        let recent = transfer("alice", "A", "B", dec!(40));
        let now = Utc::now();

        let mut old = transfer("alice", "A", "B", dec!(60));
        old.created_at = now - Duration::days(3);
        let foreign = transfer("bob", "B", "A", dec!(1));
        for txn in [&recent, &old, &foreign] {
            cache.put_transaction(txn).await.unwrap();
        }
        let history = HistoryService::new(cache);

        let day = history
            .summarize("alice", Some("A".to_string()), SummaryPeriod::Day, now)
            .await
            .unwrap();
        assert_eq!(day.period.period, SummaryPeriod::Day);
        assert_eq!(day.period.end_date - day.period.start_date, Duration::days(1));
        assert_eq!(day.summary.total_transactions, 1);
        assert_eq!(day.summary.transfers_out.amount, dec!(40));

        let week = history
            .summarize("alice", Some("A".to_string()), SummaryPeriod::Week, now)
            .await
            .unwrap();
        assert_eq!(week.summary.transfers_out, Bucket { count: 2, amount: dec!(100) });
        assert_eq!(week.summary.transfers_in.count, 0);
    }
}
