//! Database module
//!
//! Connectivity, schema checks and cache warm-up.

use sqlx::PgPool;

use crate::store::{AccountStore, LedgerStore, StoreError};

/// Tables the server cannot run without
const REQUIRED_TABLES: &[&str] = &["accounts", "transactions", "audit_logs"];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}

/// Load every active ledger account into the cache tier.
///
/// Runs once at startup, before the server accepts requests. Returns the
/// number of accounts loaded.
pub async fn warm_account_cache(
    ledger: &dyn LedgerStore,
    cache: &dyn AccountStore,
) -> Result<usize, StoreError> {
    let accounts = ledger.list_active_accounts().await?;
    let count = accounts.len();

    for account in accounts {
        cache.put_account(account).await?;
    }

    tracing::info!(accounts = count, "Account cache warmed from ledger");
    Ok(count)
}
