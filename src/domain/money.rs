//! Money type
//!
//! Domain primitive for monetary values with validation at construction.
//! Every amount that enters the pipeline is converted to an exact decimal
//! here, at the boundary; no floating point is used for money anywhere
//! downstream.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

/// Maximum representable total (1 trillion)
const MAX_AMOUNT: &str = "1000000000000";

/// Maximum decimal places (4)
const MAX_SCALE: u32 = 4;

/// Money represents a validated, non-negative monetary value.
///
/// # Invariants
/// - Value is never negative
/// - Maximum 4 decimal places
/// - Maximum value is 1 trillion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use shopstream::domain::Money;
///
/// let amount = Money::new(Decimal::new(1999, 2)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(1999, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

/// Errors that can occur when creating a Money value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Amount must not be negative (got {0})")]
    Negative(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Money {
    /// Create a new Money value with validation.
    ///
    /// # Errors
    /// - `MoneyError::Negative` if value < 0
    /// - `MoneyError::TooManyDecimals` if more than 4 decimal places
    /// - `MoneyError::Overflow` if value > 1 trillion
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value < Decimal::ZERO {
            return Err(MoneyError::Negative(value));
        }

        if value.scale() > MAX_SCALE {
            return Err(MoneyError::TooManyDecimals(value.scale()));
        }

        let max = Decimal::from_str(MAX_AMOUNT).expect("Invalid MAX_AMOUNT constant");
        if value > max {
            return Err(MoneyError::Overflow);
        }

        Ok(Self(value))
    }

    /// Zero amount
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Check whether this amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Add another amount, validating the result.
    pub fn try_add(&self, other: &Money) -> Result<Money, MoneyError> {
        Money::new(self.0 + other.0)
    }

    /// Construct from a value already persisted by the store, bypassing
    /// validation. Only for rows written through the merge path.
    pub(crate) fn from_stored(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s).map_err(|e| MoneyError::ParseError(e.to_string()))?;
        Money::new(decimal)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Result<Money, MoneyError>;

    fn add(self, rhs: Self) -> Self::Output {
        self.try_add(&rhs)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}
