//! Transfer Orchestrator
//!
//! Validates a transfer, commits it to the cache tier and hands it to the
//! reconciliation queue for the ledger.
//!
//! The funds check reads the balance and the debit is applied later without a
//! lock or conditional write. Two concurrent transfers from one account can
//! both pass the check and together overdraw it.

use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

use crate::audit::{AuditAction, AuditRecord, AuditSink};
use crate::domain::{
    Amount, DomainError, SecurityContext, Transaction, TransactionStatus, DEFAULT_MAX_TRANSFER,
};
use crate::error::{AppError, AppResult};
use crate::notify::{Notification, Notifier};
use crate::reconciliation::ReconciliationQueue;
use crate::store::{AccountStore, LedgerStore, StoreError};

use super::{AccessGuard, BalanceService, TransferCommand};

/// Coordinates validation, the cache commit and the ledger hand-off
pub struct TransferOrchestrator {
    cache: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerStore>,
    access_guard: Arc<AccessGuard>,
    balances: Arc<BalanceService>,
    queue: Arc<dyn ReconciliationQueue>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    max_transfer_amount: Decimal,
}

impl TransferOrchestrator {
    pub fn new(
        cache: Arc<dyn AccountStore>,
        ledger: Arc<dyn LedgerStore>,
        queue: Arc<dyn ReconciliationQueue>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            access_guard: Arc::new(AccessGuard::new(cache.clone(), ledger.clone())),
            balances: Arc::new(BalanceService::new(cache.clone(), ledger.clone())),
            cache,
            ledger,
            queue,
            notifier,
            audit,
            max_transfer_amount: DEFAULT_MAX_TRANSFER,
        }
    }

    /// Override the per-transfer ceiling (inclusive)
    pub fn with_max_transfer_amount(mut self, max_transfer_amount: Decimal) -> Self {
        self.max_transfer_amount = max_transfer_amount;
        self
    }

    pub fn access_guard(&self) -> Arc<AccessGuard> {
        Arc::clone(&self.access_guard)
    }

    pub fn balance_service(&self) -> Arc<BalanceService> {
        Arc::clone(&self.balances)
    }

    /// Execute a transfer.
    ///
    /// Every validation failure is returned before any store is written.
    /// Once the cache commit has happened the transfer has taken effect,
    /// whatever becomes of the queue, notifications or audit.
    pub async fn transfer(
        &self,
        ctx: &SecurityContext,
        command: TransferCommand,
    ) -> AppResult<Transaction> {
        if !ctx.is_authenticated() {
            return Err(AppError::Unauthorized);
        }

        let amount = Amount::new(command.amount)
            .and_then(|a| a.ensure_within(self.max_transfer_amount))
            .map_err(DomainError::from)?;

        let from = command.from_account_id.as_str();
        let to = command.to_account_id.as_str();

        if from == to {
            return Err(DomainError::SameAccount.into());
        }

        if !self.access_guard.authorize(&ctx.user_id, from).await {
            tracing::warn!(
                user_id = %ctx.user_id,
                account_id = %from,
                "Transfer denied: principal does not own source account"
            );
            self.record_audit(
                AuditRecord::new(AuditAction::AccessDenied, ctx)
                    .account(from)
                    .payload(&json!({ "operation": "transfer", "to_account_id": to })),
            )
            .await;
            return Err(AppError::AccessDenied(from.to_string()));
        }

        self.check_funds(ctx, from, amount).await?;
        self.check_destination(to).await?;

        // Both legs must be in the cache before any delta is applied
        self.ensure_cached(from).await?;
        self.ensure_cached(to).await?;

        let pending = Transaction::new_transfer(from, to, amount, &command.description, ctx);

        tracing::info!(
            transaction_id = %pending.transaction_id,
            reference_number = %pending.reference_number,
            from_account_id = %from,
            to_account_id = %to,
            amount = %amount,
            "Transfer validated, committing to cache"
        );

        let completed = self.commit(ctx, pending).await?;

        if let Err(e) = self.queue.enqueue(completed.clone()).await {
            tracing::error!(
                transaction_id = %completed.transaction_id,
                reference_number = %completed.reference_number,
                error = %e,
                "Failed to enqueue transaction for reconciliation"
            );
        }

        for notification in Notification::for_transfer(&completed) {
            let account_id = notification.account_id.clone();
            if let Err(e) = self.notifier.notify(notification).await {
                tracing::warn!(
                    transaction_id = %completed.transaction_id,
                    account_id = %account_id,
                    error = %e,
                    "Failed to send transfer notification"
                );
            }
        }

        self.record_audit(
            AuditRecord::new(AuditAction::TransferSuccess, ctx)
                .transaction(completed.transaction_id)
                .account(from)
                .payload(&json!({
                    "reference_number": completed.reference_number,
                    "from_account_id": from,
                    "to_account_id": to,
                    "amount": completed.amount,
                    "description": completed.description,
                })),
        )
        .await;

        tracing::info!(
            transaction_id = %completed.transaction_id,
            reference_number = %completed.reference_number,
            "Transfer completed"
        );

        Ok(completed)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    async fn check_funds(&self, ctx: &SecurityContext, from: &str, amount: Amount) -> AppResult<()> {
        let snapshot = self.balances.get_balance(from).await?;

        let available = snapshot.as_ref().map_or(Decimal::ZERO, |s| s.balance);
        let sufficient = amount.is_covered_by(available);

        if let Some(snapshot) = &snapshot {
            self.record_audit(
                AuditRecord::new(AuditAction::BalanceCheck, ctx)
                    .account(from)
                    .payload(&json!({
                        "source": snapshot.source,
                        "required": amount.value(),
                        "sufficient": sufficient,
                    })),
            )
            .await;
        }

        if !sufficient {
            return Err(DomainError::insufficient_funds(amount.value(), available).into());
        }
        Ok(())
    }

    /// The destination must exist and be active. An active cache entry is
    /// accepted as is; anything else is settled by the ledger.
    async fn check_destination(&self, to: &str) -> AppResult<()> {
        match self.cache.get_account(to).await {
            Ok(Some(account)) if account.is_active => return Ok(()),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    account_id = %to,
                    error = %e,
                    "Cache lookup for destination failed, using ledger"
                );
            }
        }

        match self.ledger.get_account(to).await? {
            Some(account) if account.is_active => Ok(()),
            _ => Err(DomainError::DestinationNotFound(to.to_string()).into()),
        }
    }

    /// Seed an account known only to the ledger into the cache.
    ///
    /// The ledger row is authoritative for an account this process has never
    /// cached. Seeding is insert-if-absent, so a concurrent transfer that got
    /// there first keeps its entry.
    async fn ensure_cached(&self, account_id: &str) -> AppResult<()> {
        match self.cache.get_account(account_id).await {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    error = %e,
                    "Cache lookup failed before commit"
                );
                return Ok(());
            }
        }

        let Some(account) = self.ledger.get_account(account_id).await? else {
            return Ok(());
        };

        match self.cache.seed_account(account).await {
            Ok(true) => {
                tracing::info!(account_id = %account_id, "Account seeded into cache from ledger");
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    error = %e,
                    "Failed to seed account into cache"
                );
            }
        }
        Ok(())
    }

    // =========================================================================
    // Cache commit
    // =========================================================================

    /// Write the pending record, then the debit and credit legs.
    ///
    /// A failed leg reverses the legs already applied and marks the record
    /// failed. The failed record is still queued so the ledger keeps a trace
    /// of it (without balance effects).
    async fn commit(&self, ctx: &SecurityContext, pending: Transaction) -> AppResult<Transaction> {
        if let Err(e) = self.cache.put_transaction(&pending).await {
            tracing::error!(
                transaction_id = %pending.transaction_id,
                error = %e,
                "Failed to record pending transaction"
            );
            let reason = format!("could not record transaction: {e}");
            self.record_failure_audit(ctx, &pending, &reason).await;
            return Err(AppError::TransferFailed(reason));
        }

        let legs: Vec<(String, Decimal)> = pending
            .balance_deltas()
            .into_iter()
            .map(|(account_id, delta)| (account_id.to_string(), delta))
            .collect();

        let mut applied: Vec<(String, Decimal)> = Vec::with_capacity(legs.len());

        for (account_id, delta) in legs {
            match self.cache.adjust_balance(&account_id, delta).await {
                Ok(new_balance) => {
                    tracing::debug!(
                        transaction_id = %pending.transaction_id,
                        account_id = %account_id,
                        delta = %delta,
                        new_balance = %new_balance,
                        "Balance leg applied"
                    );
                    applied.push((account_id, delta));
                }
                Err(e) => {
                    return Err(self.abort(ctx, pending, &account_id, &applied, e).await);
                }
            }
        }

        let completed = pending.with_status(TransactionStatus::Completed);
        self.store_status(&completed).await;

        Ok(completed)
    }

    async fn abort(
        &self,
        ctx: &SecurityContext,
        pending: Transaction,
        failed_account: &str,
        applied: &[(String, Decimal)],
        cause: StoreError,
    ) -> AppError {
        tracing::error!(
            transaction_id = %pending.transaction_id,
            account_id = %failed_account,
            error = %cause,
            "Balance leg failed, reversing applied legs"
        );

        let mut unreversed = Vec::new();
        for (account_id, delta) in applied.iter().rev() {
            if let Err(e) = self.cache.adjust_balance(account_id, -*delta).await {
                tracing::error!(
                    transaction_id = %pending.transaction_id,
                    reference_number = %pending.reference_number,
                    account_id = %account_id,
                    delta = %delta,
                    error = %e,
                    "Compensating reversal failed, manual reconciliation required"
                );
                unreversed.push(account_id.as_str());
            }
        }

        let reason = if unreversed.is_empty() {
            format!("leg on {failed_account} failed: {cause}; applied legs reversed")
        } else {
            format!(
                "leg on {failed_account} failed: {cause}; reversal failed for {}",
                unreversed.join(", ")
            )
        };

        let failed = pending.failed(reason.clone());

        self.store_status(&failed).await;

        if let Err(e) = self.queue.enqueue(failed.clone()).await {
            tracing::error!(
                transaction_id = %failed.transaction_id,
                error = %e,
                "Failed to enqueue failed transaction for reconciliation"
            );
        }

        self.record_failure_audit(ctx, &failed, &reason).await;

        AppError::TransferFailed(reason)
    }

    /// Bring the cached record in line with `txn.status`.
    ///
    /// Falls back to rewriting the whole record, which is keyed by id, when
    /// the status update is refused.
    async fn store_status(&self, txn: &Transaction) {
        let Err(e) = self
            .cache
            .set_transaction_status(
                txn.transaction_id,
                txn.status,
                txn.metadata.failure_reason.clone(),
            )
            .await
        else {
            return;
        };

        tracing::warn!(
            transaction_id = %txn.transaction_id,
            status = %txn.status.as_str(),
            error = %e,
            "Status update failed, rewriting transaction record"
        );

        if let Err(e) = self.cache.put_transaction(txn).await {
            tracing::error!(
                transaction_id = %txn.transaction_id,
                reference_number = %txn.reference_number,
                status = %txn.status.as_str(),
                error = %e,
                "Cached transaction record is stale, manual reconciliation required"
            );
        }
    }

    // =========================================================================
    // Audit
    // =========================================================================

    async fn record_failure_audit(&self, ctx: &SecurityContext, txn: &Transaction, reason: &str) {
        self.record_audit(
            AuditRecord::new(AuditAction::TransferFailed, ctx)
                .transaction(txn.transaction_id)
                .account(txn.from_account_id.as_deref().unwrap_or_default())
                .payload(&json!({
                    "reference_number": txn.reference_number,
                    "amount": txn.amount,
                    "reason": reason,
                })),
        )
        .await;
    }

    async fn record_audit(&self, record: AuditRecord) {
        let action = record.action;
        if let Err(e) = self.audit.record(record).await {
            tracing::warn!(action = %action, error = %e, "Failed to record audit entry");
        }
    }
}
