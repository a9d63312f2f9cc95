//! PostgreSQL ledger
//!
//! Authoritative balances and reconciled transaction history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction as PgTransaction};
use uuid::Uuid;

use crate::domain::{Account, Transaction, TransactionMetadata, TransactionStatus};

use super::{ApplyOutcome, LedgerStore, StoreError, StoreResult};

type AccountRow = (String, String, String, Decimal, String, bool, DateTime<Utc>);

type TransactionRow = (
    Uuid,
    Option<String>,
    Option<String>,
    Decimal,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    serde_json::Value,
);

/// Ledger backed by the `accounts` and `transactions` tables
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add `delta` to one account inside `tx`
    async fn apply_delta(
        tx: &mut PgTransaction<'_, Postgres>,
        account_id: &str,
        delta: Decimal,
    ) -> StoreResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance + $2, updated_at = NOW()
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::AccountNotFound(account_id.to_string()));
        }
        Ok(())
    }
}

fn account_from_row(row: AccountRow) -> StoreResult<Account> {
    let (account_id, owner_id, account_type, balance, currency, is_active, updated_at) = row;
    Ok(Account {
        account_type: account_type.parse().map_err(StoreError::Corrupt)?,
        account_id,
        owner_id,
        balance,
        currency,
        is_active,
        updated_at,
    })
}

fn transaction_from_row(row: TransactionRow) -> StoreResult<Transaction> {
    let (
        transaction_id,
        from_account_id,
        to_account_id,
        amount,
        transaction_type,
        status,
        description,
        reference_number,
        created_at,
        updated_at,
        metadata,
    ) = row;

    Ok(Transaction {
        transaction_id,
        from_account_id,
        to_account_id,
        amount,
        transaction_type: transaction_type.parse().map_err(StoreError::Corrupt)?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        description,
        reference_number: reference_number
            .parse()
            .map_err(|e: crate::domain::ReferenceNumberError| StoreError::Corrupt(e.to_string()))?,
        created_at,
        updated_at,
        metadata: serde_json::from_value::<TransactionMetadata>(metadata)?,
    })
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_account(&self, account_id: &str) -> StoreResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT account_id, owner_id, account_type, balance, currency, is_active, updated_at
            FROM accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn list_active_accounts(&self) -> StoreResult<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            r#"
            SELECT account_id, owner_id, account_type, balance, currency, is_active, updated_at
            FROM accounts
            WHERE is_active = true
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(account_from_row).collect()
    }

    async fn get_transaction(&self, transaction_id: Uuid) -> StoreResult<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT transaction_id, from_account_id, to_account_id, amount,
                   transaction_type, status, description, reference_number,
                   created_at, updated_at, metadata
            FROM transactions
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(transaction_from_row).transpose()
    }

    async fn apply_transaction(&self, txn: &Transaction) -> StoreResult<ApplyOutcome> {
        let metadata = serde_json::to_value(&txn.metadata)?;

        let mut tx = self.pool.begin().await?;

        // The row insert is the "not already applied" guard: deltas run only
        // when this statement wrote a row, and both commit together.
        let inserted = sqlx::query(
            r#"
            INSERT INTO transactions (
                transaction_id, from_account_id, to_account_id, amount,
                transaction_type, status, description, reference_number,
                created_at, updated_at, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(txn.transaction_id)
        .bind(&txn.from_account_id)
        .bind(&txn.to_account_id)
        .bind(txn.amount)
        .bind(txn.transaction_type.as_str())
        .bind(txn.status.as_str())
        .bind(&txn.description)
        .bind(txn.reference_number.as_str())
        .bind(txn.created_at)
        .bind(txn.updated_at)
        .bind(&metadata)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            tracing::debug!(
                transaction_id = %txn.transaction_id,
                "Transaction already present in ledger"
            );
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        if txn.status == TransactionStatus::Completed {
            for (account_id, delta) in txn.balance_deltas() {
                // Dropping `tx` on error rolls the whole unit back.
                Self::apply_delta(&mut tx, account_id, delta).await?;
            }
        }

        tx.commit().await?;

        tracing::debug!(
            transaction_id = %txn.transaction_id,
            reference_number = %txn.reference_number,
            "Transaction applied to ledger"
        );

        Ok(ApplyOutcome::Applied)
    }
}
