//! Store trait
//!
//! Seam to the keyed document store the aggregation core runs against.
//! Implementations must make every merge operation atomic per key: a
//! genuine server-side add (or an equivalent per-key critical section),
//! never a caller-side read-then-write, so concurrent deltas against the
//! same bucket can never lose an increment.

use async_trait::async_trait;

use super::{
    AggregateRecord, CustomerProfile, CustomerUpdate, Dimension, InventoryFilter, InventoryRecord,
    ItemSale, MetricDelta, MetricKey, NotificationKind, NotificationRecord, StockChange,
};

/// Errors from store operations.
///
/// The "record does not exist yet" case is never surfaced: implementations
/// fall back to the create path internally. What remains is either a bad
/// delta (event-level failure) or loss of the backend (fatal, aborts the
/// batch).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend connectivity or query failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored state could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The delta itself is unusable (e.g. accumulated total would overflow)
    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    /// Stored row holds a value outside the domain (manual edits, schema drift)
    #[error("Invalid stored value: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Fatal errors abort the whole batch; the rest fail only their event.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

/// Keyed document store with atomic merge primitives.
///
/// Merge operations take the originating event id and record it per key;
/// re-merging an already-applied event is a no-op returning current state,
/// so at-least-once delivery does not double-count.
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically fold a delta into the bucket for `key`, creating the
    /// record seeded from the delta when absent.
    async fn merge_metric(
        &self,
        key: &MetricKey,
        delta: &MetricDelta,
    ) -> Result<AggregateRecord, StoreError>;

    /// Point lookup of one bucket.
    async fn get_metric(&self, key: &MetricKey) -> Result<Option<AggregateRecord>, StoreError>;

    /// All buckets of one dimension, sorted by bucket label.
    async fn scan_metrics(&self, dimension: Dimension) -> Result<Vec<AggregateRecord>, StoreError>;

    /// Atomically fold one purchase into the customer's profile, creating
    /// it (type `new`, cohort fixed) when absent.
    async fn merge_customer(&self, update: &CustomerUpdate)
        -> Result<CustomerProfile, StoreError>;

    /// Point lookup of one customer profile.
    async fn get_customer(&self, customer_id: &str)
        -> Result<Option<CustomerProfile>, StoreError>;

    /// Atomically apply a sale against a product's stock, seeding an unseen
    /// product at the default initial level. Returns the prior state
    /// alongside the updated record for threshold-crossing detection.
    async fn apply_sale(&self, sale: &ItemSale) -> Result<StockChange, StoreError>;

    /// Point lookup of one product's stock record.
    async fn get_inventory(&self, product_id: &str)
        -> Result<Option<InventoryRecord>, StoreError>;

    /// All stock records matching the filter, sorted by product id.
    async fn scan_inventory(
        &self,
        filter: &InventoryFilter,
    ) -> Result<Vec<InventoryRecord>, StoreError>;

    /// Append a write-once notification record.
    async fn record_notification(&self, record: &NotificationRecord) -> Result<(), StoreError>;

    /// Most recent notifications, newest first, optionally by kind.
    async fn list_notifications(
        &self,
        kind: Option<NotificationKind>,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError>;
}
