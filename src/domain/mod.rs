//! Domain module
//!
//! Core banking types and validation rules.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;
pub mod transaction;

pub use account::{Account, AccountType};
pub use amount::{Amount, AmountError, DEFAULT_MAX_TRANSFER};
pub use context::SecurityContext;
pub use error::DomainError;
pub use transaction::{
    ReferenceNumber, ReferenceNumberError, Transaction, TransactionMetadata, TransactionStatus,
    TransactionType,
};
