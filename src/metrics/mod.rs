//! Metrics module
//!
//! The incremental aggregation core: keyed cumulative rollups (sales by
//! day/week/month, customer cohorts), per-product inventory state, and
//! per-customer profiles, all mutated exclusively through the atomic merge
//! operations of the [`Store`] trait.

mod store;

pub mod memory;
pub mod postgres;

pub use store::{Store, StoreError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::classify::{self, CustomerSegment, StockStatus};
use crate::domain::{CustomerType, Money, MoneyError};

/// Accumulation dimension of a metric bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Date,
    Week,
    Month,
    Cohort,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Date => "date",
            Dimension::Week => "week",
            Dimension::Month => "month",
            Dimension::Cohort => "cohort",
        }
    }

    /// Key prefix for range scans over this dimension.
    pub fn prefix(&self) -> String {
        format!("{}#", self.as_str())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(Dimension::Date),
            "week" => Ok(Dimension::Week),
            "month" => Ok(Dimension::Month),
            "cohort" => Ok(Dimension::Cohort),
            other => Err(format!("unknown dimension: {other}")),
        }
    }
}

/// Composite identity of an aggregate bucket: `(dimension, bucket)`,
/// rendered as `date#2024-05-01`, `week#2024-W18`, `month#2024-05`,
/// `cohort#2024-05`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub dimension: Dimension,
    pub bucket: String,
}

impl MetricKey {
    pub fn new(dimension: Dimension, bucket: impl Into<String>) -> Self {
        Self {
            dimension,
            bucket: bucket.into(),
        }
    }

    /// Daily bucket for a timestamp (`%Y-%m-%d`).
    pub fn daily(at: DateTime<Utc>) -> Self {
        Self::new(Dimension::Date, at.format("%Y-%m-%d").to_string())
    }

    /// Weekly bucket for a timestamp (`%Y-W%W`, Monday-first week of year).
    pub fn weekly(at: DateTime<Utc>) -> Self {
        Self::new(Dimension::Week, at.format("%Y-W%W").to_string())
    }

    /// Monthly bucket for a timestamp (`%Y-%m`).
    pub fn monthly(at: DateTime<Utc>) -> Self {
        Self::new(Dimension::Month, at.format("%Y-%m").to_string())
    }

    /// Cohort bucket for a calendar month label.
    pub fn cohort(month: impl Into<String>) -> Self {
        Self::new(Dimension::Cohort, month)
    }

    /// Storage key: `{dimension}#{bucket}`.
    pub fn render(&self) -> String {
        format!("{}#{}", self.dimension, self.bucket)
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.dimension, self.bucket)
    }
}

/// The contribution a single event merges into one bucket.
///
/// Numeric fields add; `tags` unions. Deltas commute: any permutation of a
/// set of deltas yields the same final record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDelta {
    /// Originating event, recorded per key so redelivery does not double-count
    pub event_id: Uuid,
    pub amount: Money,
    pub transaction_count: i64,
    pub item_count: i64,
    pub customer_count: i64,
    pub repeat_customers: i64,
    pub new_customers: i64,
    pub tags: BTreeSet<String>,
}

impl MetricDelta {
    /// Delta for one processed order: revenue, one transaction, its item
    /// count, and the distinct categories observed.
    pub fn sale(event_id: Uuid, amount: Money, item_count: i64, tags: BTreeSet<String>) -> Self {
        Self {
            event_id,
            amount,
            transaction_count: 1,
            item_count,
            customer_count: 0,
            repeat_customers: 0,
            new_customers: 0,
            tags,
        }
    }

    /// Delta for one analyzed customer: cohort revenue plus customer tallies
    /// by type.
    pub fn cohort(event_id: Uuid, total_spent: Money, customer_type: CustomerType) -> Self {
        Self {
            event_id,
            amount: total_spent,
            transaction_count: 0,
            item_count: 0,
            customer_count: 1,
            repeat_customers: i64::from(customer_type == CustomerType::Repeat),
            new_customers: i64::from(customer_type == CustomerType::New),
            tags: BTreeSet::new(),
        }
    }
}

/// A keyed, cumulative rollup. Created on the first event for its key,
/// mutated on every subsequent one, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub key: MetricKey,
    pub total_amount: Money,
    pub transaction_count: i64,
    pub item_count: i64,
    pub customer_count: i64,
    pub repeat_customers: i64,
    pub new_customers: i64,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AggregateRecord {
    /// Empty record for a key, ready to absorb its first delta.
    pub fn empty(key: MetricKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            total_amount: Money::zero(),
            transaction_count: 0,
            item_count: 0,
            customer_count: 0,
            repeat_customers: 0,
            new_customers: 0,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold a delta into this record: add numeric fields, union tags.
    pub fn absorb(&mut self, delta: &MetricDelta, now: DateTime<Utc>) -> Result<(), MoneyError> {
        self.total_amount = self.total_amount.try_add(&delta.amount)?;
        self.transaction_count += delta.transaction_count;
        self.item_count += delta.item_count;
        self.customer_count += delta.customer_count;
        self.repeat_customers += delta.repeat_customers;
        self.new_customers += delta.new_customers;
        self.tags.extend(delta.tags.iter().cloned());
        self.updated_at = now;
        Ok(())
    }
}

/// Atomic profile update for one purchase by one customer.
#[derive(Debug, Clone)]
pub struct CustomerUpdate {
    pub event_id: Uuid,
    pub customer_id: String,
    pub amount: Money,
    pub categories: BTreeSet<String>,
    pub purchased_at: DateTime<Utc>,
    pub payment_method: String,
    pub shipping_state: String,
    /// Calendar month of the purchase; fixes the cohort on first observation
    pub cohort: String,
}

/// Per-customer cumulative rollup with a derived marketing segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_id: String,
    /// Calendar month the customer was first observed; never overwritten
    pub cohort: String,
    pub customer_type: CustomerType,
    pub total_purchases: i64,
    pub total_spent: Money,
    pub average_order_value: Decimal,
    pub purchase_categories: BTreeSet<String>,
    pub first_purchase_at: DateTime<Utc>,
    pub last_purchase_at: DateTime<Utc>,
    pub last_purchase_amount: Money,
    pub payment_method: String,
    pub shipping_state: String,
    /// Recomputed on every merge
    pub segment: CustomerSegment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerProfile {
    /// Profile seeded from a customer's first observed purchase.
    pub fn first_purchase(update: &CustomerUpdate, now: DateTime<Utc>) -> Self {
        let segment = classify::customer_segment(update.amount.value(), CustomerType::New);
        Self {
            customer_id: update.customer_id.clone(),
            cohort: update.cohort.clone(),
            customer_type: CustomerType::New,
            total_purchases: 1,
            total_spent: update.amount,
            average_order_value: update.amount.value(),
            purchase_categories: update.categories.clone(),
            first_purchase_at: update.purchased_at,
            last_purchase_at: update.purchased_at,
            last_purchase_amount: update.amount,
            payment_method: update.payment_method.clone(),
            shipping_state: update.shipping_state.clone(),
            segment,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold a subsequent purchase into the profile and re-derive the segment.
    pub fn absorb(&mut self, update: &CustomerUpdate, now: DateTime<Utc>) -> Result<(), MoneyError> {
        self.customer_type = CustomerType::Repeat;
        self.total_purchases += 1;
        self.total_spent = self.total_spent.try_add(&update.amount)?;
        self.average_order_value = (self.total_spent.value()
            / Decimal::from(self.total_purchases))
        .round_dp(2);
        self.purchase_categories
            .extend(update.categories.iter().cloned());
        self.last_purchase_at = update.purchased_at;
        self.last_purchase_amount = update.amount;
        self.payment_method = update.payment_method.clone();
        self.shipping_state = update.shipping_state.clone();
        self.segment = classify::customer_segment(self.total_spent.value(), self.customer_type);
        self.updated_at = now;
        Ok(())
    }
}

/// One product's worth of a transaction, ready to apply against stock.
#[derive(Debug, Clone)]
pub struct ItemSale {
    pub event_id: Uuid,
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub quantity: i64,
}

/// Per-product stock rollup. Unlike revenue metrics, `stock_level`
/// decreases; it is floored at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub stock_level: i64,
    pub units_sold_total: i64,
    /// Recomputed on every merge
    pub status: StockStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Record for a product never seen before, seeded at the default
    /// initial stock with nothing sold yet.
    pub fn seed(sale: &ItemSale, now: DateTime<Utc>) -> Self {
        Self {
            product_id: sale.product_id.clone(),
            product_name: sale.product_name.clone(),
            category: sale.category.clone(),
            stock_level: classify::DEFAULT_INITIAL_STOCK,
            units_sold_total: 0,
            status: classify::stock_status(classify::DEFAULT_INITIAL_STOCK),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a sale: decrement stock (floored at zero), tally units sold,
    /// re-derive the status.
    pub fn apply(&mut self, sale: &ItemSale, now: DateTime<Utc>) {
        self.stock_level = (self.stock_level - sale.quantity).max(0);
        self.units_sold_total += sale.quantity;
        self.status = classify::stock_status(self.stock_level);
        self.product_name = sale.product_name.clone();
        self.category = sale.category.clone();
        self.updated_at = now;
    }
}

/// Outcome of applying a sale, with the prior state so callers can detect
/// threshold crossings.
#[derive(Debug, Clone)]
pub struct StockChange {
    pub record: InventoryRecord,
    pub previous_stock: i64,
    pub previous_status: StockStatus,
}

impl StockChange {
    /// True only when this merge moved the product from normal into low.
    /// A product already low does not re-trigger, and a deduplicated
    /// redelivery never reports a crossing.
    pub fn crossed_into_low(&self) -> bool {
        self.previous_status == StockStatus::Normal && self.record.status == StockStatus::Low
    }
}

/// Inventory scan filter.
#[derive(Debug, Clone, Default)]
pub struct InventoryFilter {
    pub status: Option<StockStatus>,
    pub category: Option<String>,
}

impl InventoryFilter {
    pub fn matches(&self, record: &InventoryRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &record.category != category {
                return false;
            }
        }
        true
    }
}

/// Kinds of notifications the pipeline emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    InventoryAlert,
    OrderConfirmation,
    CustomerLoyalty,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::InventoryAlert => "inventory_alert",
            NotificationKind::OrderConfirmation => "order_confirmation",
            NotificationKind::CustomerLoyalty => "customer_loyalty",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write-once notification log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub subject: String,
    pub message: String,
    pub recipient: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_metric_key_rendering() {
        let at = ts(2024, 5, 1);
        assert_eq!(MetricKey::daily(at).render(), "date#2024-05-01");
        assert_eq!(MetricKey::monthly(at).render(), "month#2024-05");
        assert_eq!(MetricKey::cohort("2024-05").render(), "cohort#2024-05");
    }

    #[test]
    fn test_weekly_key_uses_monday_first_week_numbers() {
        // 2024-01-01 was a Monday: week 01 under %W
        assert_eq!(MetricKey::weekly(ts(2024, 1, 1)).render(), "week#2024-W01");
        // Days before the first Monday of a year fall in week 00
        assert_eq!(MetricKey::weekly(ts(2023, 1, 1)).render(), "week#2023-W00");
    }

    #[test]
    fn test_absorb_adds_and_unions() {
        let now = ts(2024, 5, 1);
        let mut record = AggregateRecord::empty(MetricKey::daily(now), now);

        let d1 = MetricDelta::sale(
            Uuid::new_v4(),
            "19.99".parse().unwrap(),
            2,
            BTreeSet::from(["clothing".to_string(), "footwear".to_string()]),
        );
        let d2 = MetricDelta::sale(
            Uuid::new_v4(),
            "49.99".parse().unwrap(),
            1,
            BTreeSet::from(["footwear".to_string(), "accessories".to_string()]),
        );

        record.absorb(&d1, now).unwrap();
        record.absorb(&d2, now).unwrap();

        assert_eq!(record.total_amount.value(), dec!(69.98));
        assert_eq!(record.transaction_count, 2);
        assert_eq!(record.item_count, 3);
        assert_eq!(
            record.tags,
            BTreeSet::from([
                "accessories".to_string(),
                "clothing".to_string(),
                "footwear".to_string()
            ])
        );
    }

    #[test]
    fn test_absorb_commutes() {
        let now = ts(2024, 5, 1);
        let deltas: Vec<MetricDelta> = ["19.99", "49.99", "9.99"]
            .iter()
            .map(|amount| {
                MetricDelta::sale(
                    Uuid::new_v4(),
                    amount.parse().unwrap(),
                    1,
                    BTreeSet::from(["clothing".to_string()]),
                )
            })
            .collect();

        let permutations: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for order in permutations {
            let mut record = AggregateRecord::empty(MetricKey::daily(now), now);
            for idx in order {
                record.absorb(&deltas[idx], now).unwrap();
            }
            assert_eq!(record.total_amount.value(), dec!(79.97));
            assert_eq!(record.transaction_count, 3);
            assert_eq!(record.item_count, 3);
        }
    }

    #[test]
    fn test_cohort_delta_tallies_by_type() {
        let repeat = MetricDelta::cohort(
            Uuid::new_v4(),
            "120.50".parse().unwrap(),
            CustomerType::Repeat,
        );
        assert_eq!(repeat.customer_count, 1);
        assert_eq!(repeat.repeat_customers, 1);
        assert_eq!(repeat.new_customers, 0);

        let new = MetricDelta::cohort(Uuid::new_v4(), "10".parse().unwrap(), CustomerType::New);
        assert_eq!(new.repeat_customers, 0);
        assert_eq!(new.new_customers, 1);
    }

    #[test]
    fn test_inventory_apply_floors_at_zero() {
        let now = ts(2024, 5, 1);
        let sale = ItemSale {
            event_id: Uuid::new_v4(),
            product_id: "p1003".to_string(),
            product_name: "Sneakers".to_string(),
            category: "footwear".to_string(),
            quantity: 150,
        };

        let mut record = InventoryRecord::seed(&sale, now);
        assert_eq!(record.stock_level, 100);

        record.apply(&sale, now);
        assert_eq!(record.stock_level, 0);
        assert_eq!(record.units_sold_total, 150);
        assert_eq!(record.status, StockStatus::Low);
    }

    #[test]
    fn test_profile_first_and_repeat_purchase() {
        let now = ts(2024, 5, 1);
        let update = CustomerUpdate {
            event_id: Uuid::new_v4(),
            customer_id: "cust_1001".to_string(),
            amount: "300".parse().unwrap(),
            categories: BTreeSet::from(["clothing".to_string()]),
            purchased_at: now,
            payment_method: "credit_card".to_string(),
            shipping_state: "NY".to_string(),
            cohort: "2024-05".to_string(),
        };

        let mut profile = CustomerProfile::first_purchase(&update, now);
        assert_eq!(profile.customer_type, CustomerType::New);
        // 300 > 200 on the first purchase: Frequent regardless of type
        assert_eq!(profile.segment, CustomerSegment::Frequent);
        assert_eq!(profile.cohort, "2024-05");

        let later = CustomerUpdate {
            event_id: Uuid::new_v4(),
            amount: "250".parse().unwrap(),
            purchased_at: ts(2024, 7, 2),
            cohort: "2024-07".to_string(),
            ..update
        };
        profile.absorb(&later, ts(2024, 7, 2)).unwrap();

        assert_eq!(profile.customer_type, CustomerType::Repeat);
        assert_eq!(profile.total_purchases, 2);
        assert_eq!(profile.total_spent.value(), dec!(550));
        assert_eq!(profile.average_order_value, dec!(275.00));
        assert_eq!(profile.segment, CustomerSegment::Vip);
        // Cohort stays at the month of first observation
        assert_eq!(profile.cohort, "2024-05");
    }

    #[test]
    fn test_stock_change_crossing() {
        let now = ts(2024, 5, 1);
        let sale = ItemSale {
            event_id: Uuid::new_v4(),
            product_id: "p1001".to_string(),
            product_name: "T-Shirt".to_string(),
            category: "clothing".to_string(),
            quantity: 10,
        };

        let mut record = InventoryRecord::seed(&sale, now);
        record.stock_level = 25;
        record.status = classify::stock_status(25);

        let previous_stock = record.stock_level;
        let previous_status = record.status;
        record.apply(&sale, now);

        let change = StockChange {
            record,
            previous_stock,
            previous_status,
        };
        assert_eq!(change.record.stock_level, 15);
        assert!(change.crossed_into_low());
    }

    #[test]
    fn test_inventory_filter() {
        let now = ts(2024, 5, 1);
        let sale = ItemSale {
            event_id: Uuid::new_v4(),
            product_id: "p1008".to_string(),
            product_name: "Headphones".to_string(),
            category: "electronics".to_string(),
            quantity: 1,
        };
        let record = InventoryRecord::seed(&sale, now);

        assert!(InventoryFilter::default().matches(&record));
        assert!(InventoryFilter {
            status: Some(StockStatus::Normal),
            category: Some("electronics".to_string()),
        }
        .matches(&record));
        assert!(!InventoryFilter {
            status: Some(StockStatus::Low),
            category: None,
        }
        .matches(&record));
        assert!(!InventoryFilter {
            status: None,
            category: Some("clothing".to_string()),
        }
        .matches(&record));
    }
}
