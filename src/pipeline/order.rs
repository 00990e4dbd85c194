//! Order processing step
//!
//! Validates a raw purchase, derives item count, average item price, and
//! the fulfillment center, then republishes the enriched order for the
//! downstream aggregators.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::classify;
use crate::domain::{
    DomainError, EventEnvelope, EventKind, Money, OrderProcessedDetail, PurchaseDetail,
};

use super::PipelineError;

pub struct OrderProcessor {
    bus: Arc<dyn EventBus>,
}

impl OrderProcessor {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    pub async fn process(
        &self,
        event_id: Uuid,
        detail: &PurchaseDetail,
    ) -> Result<OrderProcessedDetail, PipelineError> {
        // Amount validation happens here, at the pipeline entrance
        Money::new(detail.total_amount).map_err(DomainError::from)?;

        let item_count: i64 = detail.items.iter().map(|i| i64::from(i.quantity)).sum();
        if item_count == 0 {
            return Err(DomainError::Malformed("purchase has no items".to_string()).into());
        }

        let avg_item_price = (detail.total_amount / Decimal::from(item_count)).round_dp(2);
        let center = classify::fulfillment_center(&detail.shipping_address.state);

        let processed = OrderProcessedDetail {
            transaction_id: detail.transaction_id.clone(),
            timestamp: detail.timestamp,
            customer_id: detail.customer_id.clone(),
            items: detail.items.clone(),
            total_amount: detail.total_amount,
            payment_method: detail.payment_method.clone(),
            status: "processed".to_string(),
            fulfillment_center: center.code().to_string(),
            item_count,
            avg_item_price,
        };

        let envelope = EventEnvelope::derived(EventKind::OrderProcessed, &processed, event_id)?;
        self.bus.publish(envelope).await?;

        tracing::info!(
            transaction_id = %processed.transaction_id,
            fulfillment_center = %processed.fulfillment_center,
            item_count = processed.item_count,
            "Order processed"
        );

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryEventBus;
    use crate::domain::{LineItem, ShippingAddress};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn purchase(state: &str) -> PurchaseDetail {
        PurchaseDetail {
            transaction_id: "t-1".to_string(),
            timestamp: Utc::now(),
            customer_id: "cust_1001".to_string(),
            items: vec![
                LineItem {
                    product_id: "p1001".to_string(),
                    product_name: "T-Shirt".to_string(),
                    category: "clothing".to_string(),
                    price: dec!(19.99),
                    quantity: 2,
                },
                LineItem {
                    product_id: "p1003".to_string(),
                    product_name: "Sneakers".to_string(),
                    category: "footwear".to_string(),
                    price: dec!(79.99),
                    quantity: 1,
                },
            ],
            total_amount: dec!(119.97),
            payment_method: "credit_card".to_string(),
            shipping_address: ShippingAddress {
                street: "1 Main St".to_string(),
                city: "City".to_string(),
                state: state.to_string(),
                zip: "10001".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_process_derives_and_republishes() {
        let bus = Arc::new(InMemoryEventBus::new());
        let processor = OrderProcessor::new(bus.clone());

        let processed = processor.process(Uuid::new_v4(), &purchase("NY")).await.unwrap();

        assert_eq!(processed.status, "processed");
        assert_eq!(processed.item_count, 3);
        assert_eq!(processed.avg_item_price, dec!(39.99));
        assert_eq!(processed.fulfillment_center, "fc_east_001");

        let published = bus.published_of_kind(EventKind::OrderProcessed);
        assert_eq!(published.len(), 1);
        let republished: OrderProcessedDetail = published[0].parse_detail().unwrap();
        assert_eq!(republished.transaction_id, "t-1");
    }

    #[tokio::test]
    async fn test_unknown_state_routes_central() {
        let bus = Arc::new(InMemoryEventBus::new());
        let processor = OrderProcessor::new(bus);

        let processed = processor.process(Uuid::new_v4(), &purchase("TX")).await.unwrap();
        assert_eq!(processed.fulfillment_center, "fc_central_001");
    }

    #[tokio::test]
    async fn test_negative_amount_is_skippable() {
        let bus = Arc::new(InMemoryEventBus::new());
        let processor = OrderProcessor::new(bus.clone());

        let mut detail = purchase("NY");
        detail.total_amount = dec!(-5);

        let err = processor.process(Uuid::new_v4(), &detail).await.unwrap_err();
        assert!(err.is_skippable());
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_empty_items_is_skippable() {
        let bus = Arc::new(InMemoryEventBus::new());
        let processor = OrderProcessor::new(bus);

        let mut detail = purchase("NY");
        detail.items.clear();

        let err = processor.process(Uuid::new_v4(), &detail).await.unwrap_err();
        assert!(err.is_skippable());
    }
}
