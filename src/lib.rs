//! bank_core Library
//!
//! Balance, transfer and reconciliation core of a mobile-banking backend.
//! Re-exports modules for the server binary and integration testing.

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod reconciliation;
pub mod store;

pub use config::Config;
pub use domain::{Account, Amount, DomainError, SecurityContext, Transaction};
pub use error::{AppError, AppResult};
