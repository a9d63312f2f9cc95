//! Amount type
//!
//! Domain primitive for monetary amounts moved by a transaction.
//! Amounts are validated at construction time, so a non-positive or
//! over-precise value cannot reach the write path.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default per-transaction ceiling in currency units (inclusive).
pub const DEFAULT_MAX_TRANSFER: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Maximum decimal places (fixed-point currency units)
const MAX_SCALE: u32 = 2;

/// Amount represents a validated, strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum 2 decimal places
///
/// The per-transaction ceiling is configurable and therefore checked with
/// [`Amount::ensure_within`] rather than at construction.
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use bank_core::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(10050, 2)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(10050, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount {amount} exceeds the per-transaction limit of {ceiling}")]
    AboveCeiling { amount: Decimal, ceiling: Decimal },

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 2 decimal places
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        // 100.50 and 100.5 are the same amount; only significant digits count.
        let normalized = value.normalize();
        if normalized.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(normalized.scale()));
        }

        Ok(Self(value))
    }

    /// Create an Amount from an integer (no decimal places).
    pub fn from_integer(value: i64) -> Result<Self, AmountError> {
        Self::new(Decimal::from(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Reject amounts above `ceiling`. The boundary itself is allowed.
    pub fn ensure_within(self, ceiling: Decimal) -> Result<Self, AmountError> {
        if self.0 > ceiling {
            return Err(AmountError::AboveCeiling {
                amount: self.0,
                ceiling,
            });
        }
        Ok(self)
    }

    /// Signed delta applied to the debited account.
    pub fn as_debit(&self) -> Decimal {
        -self.0
    }

    /// Signed delta applied to the credited account.
    pub fn as_credit(&self) -> Decimal {
        self.0
    }

    /// Check if `balance` covers this amount.
    pub fn is_covered_by(&self, balance: Decimal) -> bool {
        balance >= self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
