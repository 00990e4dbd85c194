//! Customer analytics step
//!
//! Folds each purchase into the customer's profile through the store's
//! atomic merge, then republishes the post-merge snapshot for the cohort
//! aggregator, marketing export, and loyalty notifications.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::bus::EventBus;
use crate::domain::{
    CustomerAnalyzedDetail, DomainError, EventEnvelope, EventKind, Money, PurchaseDetail,
};
use crate::metrics::{CustomerProfile, CustomerUpdate, Store};

use super::PipelineError;

pub struct CustomerAnalytics {
    store: Arc<dyn Store>,
    bus: Arc<dyn EventBus>,
}

impl CustomerAnalytics {
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn EventBus>) -> Self {
        Self { store, bus }
    }

    pub async fn process(
        &self,
        event_id: Uuid,
        detail: &PurchaseDetail,
    ) -> Result<CustomerProfile, PipelineError> {
        let amount = Money::new(detail.total_amount).map_err(DomainError::from)?;
        let categories: BTreeSet<String> =
            detail.items.iter().map(|i| i.category.clone()).collect();

        let update = CustomerUpdate {
            event_id,
            customer_id: detail.customer_id.clone(),
            amount,
            categories,
            purchased_at: detail.timestamp,
            payment_method: detail.payment_method.clone(),
            shipping_state: detail.shipping_address.state.clone(),
            cohort: detail.timestamp.format("%Y-%m").to_string(),
        };

        let profile = self.store.merge_customer(&update).await?;

        let snapshot = CustomerAnalyzedDetail {
            customer_id: profile.customer_id.clone(),
            customer_type: profile.customer_type,
            cohort: profile.cohort.clone(),
            total_spent: profile.total_spent.value(),
            total_purchases: profile.total_purchases,
            average_order_value: profile.average_order_value,
            purchase_categories: profile.purchase_categories.iter().cloned().collect(),
            last_purchase_at: profile.last_purchase_at,
            last_purchase_amount: profile.last_purchase_amount.value(),
            payment_method: profile.payment_method.clone(),
            shipping_state: profile.shipping_state.clone(),
        };

        let envelope = EventEnvelope::derived(EventKind::CustomerAnalyzed, &snapshot, event_id)?;
        self.bus.publish(envelope).await?;

        tracing::info!(
            customer_id = %profile.customer_id,
            segment = %profile.segment,
            total_purchases = profile.total_purchases,
            "Customer analyzed"
        );

        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryEventBus;
    use crate::classify::CustomerSegment;
    use crate::domain::{CustomerType, LineItem, ShippingAddress};
    use crate::metrics::memory::MemoryStore;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn purchase(total: rust_decimal::Decimal, month: u32) -> PurchaseDetail {
        PurchaseDetail {
            transaction_id: format!("t-{month}"),
            timestamp: Utc.with_ymd_and_hms(2024, month, 1, 12, 0, 0).unwrap(),
            customer_id: "cust_1001".to_string(),
            items: vec![LineItem {
                product_id: "p1008".to_string(),
                product_name: "Headphones".to_string(),
                category: "electronics".to_string(),
                price: total,
                quantity: 1,
            }],
            total_amount: total,
            payment_method: "apple_pay".to_string(),
            shipping_address: ShippingAddress {
                street: "1 Main St".to_string(),
                city: "Seattle".to_string(),
                state: "WA".to_string(),
                zip: "98101".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_first_purchase_creates_profile_and_publishes() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let analytics = CustomerAnalytics::new(store.clone(), bus.clone());

        let profile = analytics
            .process(Uuid::new_v4(), &purchase(dec!(300), 5))
            .await
            .unwrap();

        assert_eq!(profile.customer_type, CustomerType::New);
        assert_eq!(profile.cohort, "2024-05");
        assert_eq!(profile.segment, CustomerSegment::Frequent);

        let published = bus.published_of_kind(EventKind::CustomerAnalyzed);
        assert_eq!(published.len(), 1);
        let snapshot: CustomerAnalyzedDetail = published[0].parse_detail().unwrap();
        assert_eq!(snapshot.total_purchases, 1);
        assert_eq!(snapshot.total_spent, dec!(300));
    }

    #[tokio::test]
    async fn test_repeat_purchase_accumulates_and_keeps_cohort() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let analytics = CustomerAnalytics::new(store.clone(), bus.clone());

        analytics
            .process(Uuid::new_v4(), &purchase(dec!(300), 5))
            .await
            .unwrap();
        let profile = analytics
            .process(Uuid::new_v4(), &purchase(dec!(250), 7))
            .await
            .unwrap();

        assert_eq!(profile.customer_type, CustomerType::Repeat);
        assert_eq!(profile.total_purchases, 2);
        assert_eq!(profile.total_spent.value(), dec!(550));
        assert_eq!(profile.segment, CustomerSegment::Vip);
        // Cohort fixed at first observation month
        assert_eq!(profile.cohort, "2024-05");

        let snapshots = bus.published_of_kind(EventKind::CustomerAnalyzed);
        assert_eq!(snapshots.len(), 2);
        let latest: CustomerAnalyzedDetail = snapshots[1].parse_detail().unwrap();
        assert_eq!(latest.cohort, "2024-05");
        assert_eq!(latest.average_order_value, dec!(275.00));
    }
}
