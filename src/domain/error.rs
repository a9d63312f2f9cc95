//! Domain Error Types
//!
//! Pure validation failures for the transfer path. They are independent of
//! the web and store layers and are always raised before any mutation.

use rust_decimal::Decimal;
use thiserror::Error;

use super::AmountError;

/// Transfer validation failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Amount is non-positive, too precise, unparseable or above the ceiling
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Source and destination are the same account
    #[error("Cannot transfer to the same account")]
    SameAccount,

    /// Source balance does not cover the amount
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Destination account is missing or inactive
    #[error("Destination account not found: {0}")]
    DestinationNotFound(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::SameAccount => "SAME_ACCOUNT",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::DestinationNotFound(_) => "DESTINATION_ACCOUNT_NOT_FOUND",
        }
    }
}

impl From<AmountError> for DomainError {
    fn from(error: AmountError) -> Self {
        DomainError::InvalidAmount(error.to_string())
    }
}
