//! Domain module
//!
//! Core domain types: exact-decimal money, event envelopes and payloads.

pub mod error;
pub mod events;
pub mod money;

pub use error::DomainError;
pub use events::{
    CustomerAnalyzedDetail, CustomerType, EventEnvelope, EventKind, InventoryAlertDetail,
    InventoryUpdatedDetail, LineItem, OrderProcessedDetail, PurchaseDetail, ShippingAddress,
};
pub use money::{Money, MoneyError};
