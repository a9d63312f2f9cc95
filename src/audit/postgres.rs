//! PostgreSQL audit sink
//!
//! Rows in `audit_logs` form a SHA-256 hash chain: each row stores the hash
//! of the previous row and a hash over its own fields plus that link.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{sha256_hex, AuditLogError, AuditRecord, AuditSink};

/// Link value for the first row in the chain
const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Advisory lock key serializing chain appends
const CHAIN_LOCK_KEY: i64 = 0x6175_6469_745f_6c6f;

type ChainRow = (
    Uuid,
    i64,
    String,
    String,
    Option<Uuid>,
    DateTime<Utc>,
    String,
    String,
    String,
);

/// Result of hash chain verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerificationResult {
    pub is_valid: bool,
    pub entries_checked: u64,
    pub first_invalid_entry: Option<Uuid>,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
}

impl ChainVerificationResult {
    fn valid(entries_checked: u64) -> Self {
        Self {
            is_valid: true,
            entries_checked,
            first_invalid_entry: None,
            expected_hash: None,
            actual_hash: None,
        }
    }

    fn broken(entries_checked: u64, id: Uuid, expected: String, actual: String) -> Self {
        Self {
            is_valid: false,
            entries_checked,
            first_invalid_entry: Some(id),
            expected_hash: Some(expected),
            actual_hash: Some(actual),
        }
    }
}

/// Hash over one row's content and its link to the previous row.
///
/// Timestamps enter at microsecond precision, which is what the column keeps.
fn chain_hash(
    id: Uuid,
    action: &str,
    user_id: &str,
    transaction_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    payload: &str,
    previous_hash: &str,
) -> String {
    let input = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        id,
        action,
        user_id,
        transaction_id.map(|t| t.to_string()).unwrap_or_default(),
        created_at.timestamp_micros(),
        payload,
        previous_hash
    );
    sha256_hex(&input)
}

/// Audit sink writing to the `audit_logs` table
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one row to the chain
    async fn append(pool: &PgPool, record: &AuditRecord) -> Result<(), AuditLogError> {
        let payload = serde_json::to_string(&record.payload)?;

        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CHAIN_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let last: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT current_hash
            FROM audit_logs
            ORDER BY sequence_number DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let previous_hash = last
            .map(|(hash,)| hash)
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let current_hash = chain_hash(
            record.id,
            record.action.as_str(),
            &record.user_id,
            record.transaction_id,
            record.timestamp,
            &payload,
            &previous_hash,
        );

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, transaction_id, user_id, action, account_id,
                ip_address, session_id, user_agent, payload,
                previous_hash, current_hash, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(record.transaction_id)
        .bind(&record.user_id)
        .bind(record.action.as_str())
        .bind(&record.account_id)
        .bind(&record.ip_address)
        .bind(&record.session_id)
        .bind(&record.user_agent)
        .bind(&payload)
        .bind(&previous_hash)
        .bind(&current_hash)
        .bind(record.timestamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            audit_id = %record.id,
            action = %record.action,
            "Audit log entry created"
        );

        Ok(())
    }

    /// Recompute the chain from the first row, up to `limit` rows
    pub async fn verify_hash_chain(
        &self,
        limit: Option<i64>,
    ) -> Result<ChainVerificationResult, AuditLogError> {
        let limit = limit.unwrap_or(1000);

        let rows: Vec<ChainRow> = sqlx::query_as(
            r#"
            SELECT id, sequence_number, action, user_id, transaction_id,
                   created_at, payload, previous_hash, current_hash
            FROM audit_logs
            ORDER BY sequence_number ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut expected_link = GENESIS_HASH.to_string();
        let mut checked = 0u64;

        for (id, _seq, action, user_id, transaction_id, created_at, payload, prev_hash, current_hash) in
            rows
        {
            checked += 1;

            if prev_hash != expected_link {
                return Ok(ChainVerificationResult::broken(checked, id, expected_link, prev_hash));
            }

            let calculated = chain_hash(
                id,
                &action,
                &user_id,
                transaction_id,
                created_at,
                &payload,
                &prev_hash,
            );

            if calculated != current_hash {
                return Ok(ChainVerificationResult::broken(checked, id, calculated, current_hash));
            }

            expected_link = current_hash;
        }

        Ok(ChainVerificationResult::valid(checked))
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    /// Hands the insert to a background task; write failures are logged there.
    async fn record(&self, record: AuditRecord) -> Result<(), AuditLogError> {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = Self::append(&pool, &record).await {
                tracing::error!(
                    audit_id = %record.id,
                    action = %record.action,
                    error = %e,
                    "Failed to write audit log entry"
                );
            }
        });
        Ok(())
    }
}
