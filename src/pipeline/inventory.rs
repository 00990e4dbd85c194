//! Inventory tracking step
//!
//! Applies each purchased item against its product's stock. Line items for
//! the same product are folded together first so one transaction applies
//! one atomic decrement per product. A normal-to-low crossing publishes
//! exactly one alert; a transaction summary event follows.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::bus::EventBus;
use crate::domain::{
    EventEnvelope, EventKind, InventoryAlertDetail, InventoryUpdatedDetail, PurchaseDetail,
};
use crate::metrics::{ItemSale, Store};

use super::PipelineError;

pub struct InventoryTracker {
    store: Arc<dyn Store>,
    bus: Arc<dyn EventBus>,
}

impl InventoryTracker {
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn EventBus>) -> Self {
        Self { store, bus }
    }

    pub async fn process(
        &self,
        event_id: Uuid,
        detail: &PurchaseDetail,
    ) -> Result<InventoryUpdatedDetail, PipelineError> {
        let mut by_product: BTreeMap<String, ItemSale> = BTreeMap::new();
        for item in &detail.items {
            by_product
                .entry(item.product_id.clone())
                .and_modify(|sale| sale.quantity += i64::from(item.quantity))
                .or_insert_with(|| ItemSale {
                    event_id,
                    product_id: item.product_id.clone(),
                    product_name: item.product_name.clone(),
                    category: item.category.clone(),
                    quantity: i64::from(item.quantity),
                });
        }

        for sale in by_product.values() {
            let change = self.store.apply_sale(sale).await?;

            if change.crossed_into_low() {
                tracing::warn!(
                    product_id = %change.record.product_id,
                    stock_level = change.record.stock_level,
                    "Low inventory"
                );

                let alert = InventoryAlertDetail {
                    product_id: change.record.product_id.clone(),
                    product_name: change.record.product_name.clone(),
                    category: change.record.category.clone(),
                    stock_level: change.record.stock_level,
                };
                let envelope = EventEnvelope::derived(EventKind::InventoryAlert, &alert, event_id)?;
                self.bus.publish(envelope).await?;
            }
        }

        let summary = InventoryUpdatedDetail {
            transaction_id: detail.transaction_id.clone(),
            timestamp: detail.timestamp,
            items_processed: detail.items.len() as i64,
        };
        let envelope = EventEnvelope::derived(EventKind::InventoryUpdated, &summary, event_id)?;
        self.bus.publish(envelope).await?;

        Ok(summary)
    }
}
