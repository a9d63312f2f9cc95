//! Handlers module
//!
//! The transfer core: access checks, balance and history reads, and the
//! orchestrator that commits transfers to the cache and queues them for the
//! ledger.

mod access_guard;
mod balance_service;
mod commands;
mod history;
mod transfer_handler;

#[cfg(test)]
mod tests;

pub use access_guard::AccessGuard;
pub use balance_service::{BalanceService, BalanceSnapshot, BalanceSource};
pub use commands::*;
pub use history::{
    Bucket, HistoryService, PeriodWindow, SummaryPeriod, SummaryReport, TransactionSummary,
    SUMMARY_SCAN_LIMIT,
};
pub use transfer_handler::TransferOrchestrator;
