//! In-memory store, useful for testing and development.
//!
//! Backed by `DashMap`; the `entry` guard holds the shard lock for the
//! duration of a merge, which makes every read-modify-write atomic per
//! key. Merges record applied event ids per key, so a redelivered event
//! is a no-op.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    AggregateRecord, CustomerProfile, CustomerUpdate, Dimension, InventoryFilter, InventoryRecord,
    ItemSale, MetricDelta, MetricKey, NotificationKind, NotificationRecord, StockChange, Store,
    StoreError,
};

#[derive(Debug)]
struct MetricEntry {
    record: AggregateRecord,
    applied: HashSet<Uuid>,
}

#[derive(Debug)]
struct CustomerEntry {
    profile: CustomerProfile,
    applied: HashSet<Uuid>,
}

#[derive(Debug)]
struct InventoryEntry {
    record: InventoryRecord,
    applied: HashSet<Uuid>,
}

/// Thread-safe in-memory implementation of [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    metrics: DashMap<String, MetricEntry>,
    customers: DashMap<String, CustomerEntry>,
    inventory: DashMap<String, InventoryEntry>,
    notifications: Mutex<Vec<NotificationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn merge_metric(
        &self,
        key: &MetricKey,
        delta: &MetricDelta,
    ) -> Result<AggregateRecord, StoreError> {
        let now = Utc::now();
        let mut entry = self
            .metrics
            .entry(key.render())
            .or_insert_with(|| MetricEntry {
                record: AggregateRecord::empty(key.clone(), now),
                applied: HashSet::new(),
            });

        if !entry.applied.contains(&delta.event_id) {
            entry
                .record
                .absorb(delta, now)
                .map_err(|e| StoreError::InvalidDelta(e.to_string()))?;
            entry.applied.insert(delta.event_id);
        }

        Ok(entry.record.clone())
    }

    async fn get_metric(&self, key: &MetricKey) -> Result<Option<AggregateRecord>, StoreError> {
        Ok(self.metrics.get(&key.render()).map(|e| e.record.clone()))
    }

    async fn scan_metrics(&self, dimension: Dimension) -> Result<Vec<AggregateRecord>, StoreError> {
        let prefix = dimension.prefix();
        let mut records: Vec<AggregateRecord> = self
            .metrics
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.record.clone())
            .collect();
        records.sort_by(|a, b| a.key.bucket.cmp(&b.key.bucket));
        Ok(records)
    }

    async fn merge_customer(
        &self,
        update: &CustomerUpdate,
    ) -> Result<CustomerProfile, StoreError> {
        let now = Utc::now();
        match self.customers.entry(update.customer_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !entry.applied.contains(&update.event_id) {
                    entry
                        .profile
                        .absorb(update, now)
                        .map_err(|e| StoreError::InvalidDelta(e.to_string()))?;
                    entry.applied.insert(update.event_id);
                }
                Ok(entry.profile.clone())
            }
            Entry::Vacant(vacant) => {
                let profile = CustomerProfile::first_purchase(update, now);
                vacant.insert(CustomerEntry {
                    profile: profile.clone(),
                    applied: HashSet::from([update.event_id]),
                });
                Ok(profile)
            }
        }
    }

    async fn get_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<CustomerProfile>, StoreError> {
        Ok(self.customers.get(customer_id).map(|e| e.profile.clone()))
    }

    async fn apply_sale(&self, sale: &ItemSale) -> Result<StockChange, StoreError> {
        let now = Utc::now();
        let mut entry = self
            .inventory
            .entry(sale.product_id.clone())
            .or_insert_with(|| InventoryEntry {
                record: InventoryRecord::seed(sale, now),
                applied: HashSet::new(),
            });

        let previous_stock = entry.record.stock_level;
        let previous_status = entry.record.status;

        if entry.applied.insert(sale.event_id) {
            entry.record.apply(sale, now);
        }

        Ok(StockChange {
            record: entry.record.clone(),
            previous_stock,
            previous_status,
        })
    }

    async fn get_inventory(
        &self,
        product_id: &str,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self.inventory.get(product_id).map(|e| e.record.clone()))
    }

    async fn scan_inventory(
        &self,
        filter: &InventoryFilter,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        let mut records: Vec<InventoryRecord> = self
            .inventory
            .iter()
            .filter(|e| filter.matches(&e.record))
            .map(|e| e.record.clone())
            .collect();
        records.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(records)
    }

    async fn record_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        let mut notifications = self
            .notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        notifications.push(record.clone());
        Ok(())
    }

    async fn list_notifications(
        &self,
        kind: Option<NotificationKind>,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let notifications = self
            .notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut matching: Vec<NotificationRecord> = notifications
            .iter()
            .filter(|n| kind.map_or(true, |k| n.kind == k))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }
}
