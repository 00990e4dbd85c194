//! Pipeline Events
//!
//! Events are immutable facts flowing between processing steps. Every event
//! travels as an `EventEnvelope` carrying a `(source, detail_type)` tag pair
//! and a JSON detail payload; the envelope resolves to an `EventKind` for
//! dispatch, so the routing table is an exhaustive enum match rather than
//! string comparisons scattered through handlers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainError;

/// Event source domains
pub const SOURCE_TRANSACTIONS: &str = "com.ecommerce.transactions";
pub const SOURCE_ORDERS: &str = "com.ecommerce.orders";
pub const SOURCE_CUSTOMERS: &str = "com.ecommerce.customers";
pub const SOURCE_INVENTORY: &str = "com.ecommerce.inventory";

/// The kinds of events the pipeline routes.
///
/// Unknown `(source, detail_type)` pairs resolve to `None` and are ignored
/// by the router, not treated as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A raw purchase transaction entering the pipeline
    Purchase,
    /// An order enriched with processing metadata
    OrderProcessed,
    /// A customer profile snapshot after analysis
    CustomerAnalyzed,
    /// Per-transaction inventory processing summary
    InventoryUpdated,
    /// Stock for a product crossed into low
    InventoryAlert,
}

impl EventKind {
    /// Resolve an event kind from its wire tags.
    pub fn from_tags(source: &str, detail_type: &str) -> Option<Self> {
        match (source, detail_type) {
            (SOURCE_TRANSACTIONS, "purchase") => Some(Self::Purchase),
            (SOURCE_ORDERS, "order_processed") => Some(Self::OrderProcessed),
            (SOURCE_CUSTOMERS, "customer_analyzed") => Some(Self::CustomerAnalyzed),
            (SOURCE_INVENTORY, "inventory_updated") => Some(Self::InventoryUpdated),
            (SOURCE_INVENTORY, "inventory_alert") => Some(Self::InventoryAlert),
            _ => None,
        }
    }

    /// The source domain this kind is published under.
    pub fn source(&self) -> &'static str {
        match self {
            Self::Purchase => SOURCE_TRANSACTIONS,
            Self::OrderProcessed => SOURCE_ORDERS,
            Self::CustomerAnalyzed => SOURCE_CUSTOMERS,
            Self::InventoryUpdated | Self::InventoryAlert => SOURCE_INVENTORY,
        }
    }

    /// The detail type this kind is published under.
    pub fn detail_type(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::OrderProcessed => "order_processed",
            Self::CustomerAnalyzed => "customer_analyzed",
            Self::InventoryUpdated => "inventory_updated",
            Self::InventoryAlert => "inventory_alert",
        }
    }
}

/// Envelope carrying any pipeline event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event identity, used for redelivery deduplication
    pub event_id: Uuid,
    pub source: String,
    pub detail_type: String,
    pub timestamp: DateTime<Utc>,
    pub detail: serde_json::Value,
}

impl EventEnvelope {
    /// Wrap a typed detail payload in a new envelope.
    pub fn new<D: Serialize>(kind: EventKind, detail: &D) -> Result<Self, DomainError> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            source: kind.source().to_string(),
            detail_type: kind.detail_type().to_string(),
            timestamp: Utc::now(),
            detail: serde_json::to_value(detail)?,
        })
    }

    /// Wrap a payload derived from another event, keeping the causal
    /// event id. Redelivery of the cause then reproduces byte-identical
    /// derived ids, so per-key deduplication holds across the whole
    /// fan-out chain, not just the first hop.
    pub fn derived<D: Serialize>(
        kind: EventKind,
        detail: &D,
        cause: Uuid,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            event_id: cause,
            source: kind.source().to_string(),
            detail_type: kind.detail_type().to_string(),
            timestamp: Utc::now(),
            detail: serde_json::to_value(detail)?,
        })
    }

    /// Resolve the dispatch kind, if the tag pair is known.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_tags(&self.source, &self.detail_type)
    }

    /// Deserialize the detail payload into its typed form.
    ///
    /// A payload that does not match the expected shape (missing required
    /// field, wrong type) is a malformed event; the caller skips it.
    pub fn parse_detail<D: DeserializeOwned>(&self) -> Result<D, DomainError> {
        serde_json::from_value(self.detail.clone())
            .map_err(|e| DomainError::Malformed(e.to_string()))
    }
}

/// One line item of a purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub product_name: String,
    #[serde(default = "unknown_category")]
    pub category: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub price: Decimal,
    pub quantity: u32,
}

fn unknown_category() -> String {
    "unknown".to_string()
}

/// Shipping address on a purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Raw purchase transaction as it enters the pipeline.
///
/// Monetary fields deserialize through arbitrary-precision decimal parsing:
/// the JSON literal `19.99` becomes exactly `19.99`, never a rounded f64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseDetail {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub customer_id: String,
    pub items: Vec<LineItem>,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total_amount: Decimal,
    pub payment_method: String,
    pub shipping_address: ShippingAddress,
}

/// Order after processing: the purchase enriched with derived fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderProcessedDetail {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub customer_id: String,
    pub items: Vec<LineItem>,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total_amount: Decimal,
    pub payment_method: String,
    pub status: String,
    pub fulfillment_center: String,
    pub item_count: i64,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub avg_item_price: Decimal,
}

/// Whether a customer had been seen before this purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerType {
    New,
    Repeat,
}

impl std::fmt::Display for CustomerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CustomerType::New => write!(f, "new"),
            CustomerType::Repeat => write!(f, "repeat"),
        }
    }
}

/// Customer profile snapshot published after each analyzed purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerAnalyzedDetail {
    pub customer_id: String,
    pub customer_type: CustomerType,
    pub cohort: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total_spent: Decimal,
    pub total_purchases: i64,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub average_order_value: Decimal,
    pub purchase_categories: Vec<String>,
    pub last_purchase_at: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub last_purchase_amount: Decimal,
    pub payment_method: String,
    pub shipping_state: String,
}

/// Per-transaction inventory summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryUpdatedDetail {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub items_processed: i64,
}

/// Low-stock alert payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAlertDetail {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub stock_level: i64,
}
