//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

/// Domain-level failures for events and monetary values.
///
/// These represent problems with the facts themselves (a payload missing a
/// required field, a negative amount) and are independent of the store or
/// transport layers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Event detail does not match the expected payload shape
    #[error("Malformed event detail: {0}")]
    Malformed(String),

    /// Monetary value failed validation at the boundary
    #[error(transparent)]
    Money(#[from] super::MoneyError),

    /// Payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl DomainError {
    /// Whether the offending event should be skipped rather than retried.
    ///
    /// Malformed and invalid-amount events will never parse differently on
    /// redelivery; retrying them only wedges the batch.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::Money(_))
    }
}
