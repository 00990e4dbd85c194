//! Business insights step
//!
//! Folds processed orders into the sales rollups (one event fans out to
//! the daily, weekly, and monthly buckets) and analyzed customers into
//! their cohort rollup.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{
    CustomerAnalyzedDetail, DomainError, InventoryUpdatedDetail, Money, OrderProcessedDetail,
};
use crate::metrics::{AggregateRecord, MetricDelta, MetricKey, Store};

use super::PipelineError;

pub struct InsightsAggregator {
    store: Arc<dyn Store>,
}

impl InsightsAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Merge one processed order into the day, week, and month buckets.
    pub async fn merge_sales(
        &self,
        event_id: Uuid,
        detail: &OrderProcessedDetail,
    ) -> Result<Vec<AggregateRecord>, PipelineError> {
        let amount = Money::new(detail.total_amount).map_err(DomainError::from)?;
        let item_count: i64 = detail.items.iter().map(|i| i64::from(i.quantity)).sum();
        let tags: BTreeSet<String> = detail.items.iter().map(|i| i.category.clone()).collect();

        let delta = MetricDelta::sale(event_id, amount, item_count, tags);
        let keys = [
            MetricKey::daily(detail.timestamp),
            MetricKey::weekly(detail.timestamp),
            MetricKey::monthly(detail.timestamp),
        ];

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            records.push(self.store.merge_metric(&key, &delta).await?);
        }

        tracing::info!(
            transaction_id = %detail.transaction_id,
            "Updated sales metrics"
        );

        Ok(records)
    }

    /// Merge one analyzed customer into its cohort bucket.
    pub async fn merge_cohort(
        &self,
        event_id: Uuid,
        detail: &CustomerAnalyzedDetail,
    ) -> Result<AggregateRecord, PipelineError> {
        let total_spent = Money::new(detail.total_spent).map_err(DomainError::from)?;
        let delta = MetricDelta::cohort(event_id, total_spent, detail.customer_type);

        let record = self
            .store
            .merge_metric(&MetricKey::cohort(detail.cohort.clone()), &delta)
            .await?;

        tracing::info!(
            customer_id = %detail.customer_id,
            cohort = %detail.cohort,
            "Updated customer insights"
        );

        Ok(record)
    }

    /// Inventory summaries carry no aggregate of their own; log and move on.
    pub fn inventory_summary(&self, detail: &InventoryUpdatedDetail) {
        tracing::info!(
            transaction_id = %detail.transaction_id,
            items_processed = detail.items_processed,
            "Processed inventory update"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CustomerType, LineItem};
    use crate::metrics::memory::MemoryStore;
    use crate::metrics::Dimension;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn order(total: rust_decimal::Decimal) -> OrderProcessedDetail {
        OrderProcessedDetail {
            transaction_id: "t-1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            customer_id: "cust_1001".to_string(),
            items: vec![LineItem {
                product_id: "p1001".to_string(),
                product_name: "T-Shirt".to_string(),
                category: "clothing".to_string(),
                price: total,
                quantity: 1,
            }],
            total_amount: total,
            payment_method: "credit_card".to_string(),
            status: "processed".to_string(),
            fulfillment_center: "fc_east_001".to_string(),
            item_count: 1,
            avg_item_price: total,
        }
    }

    #[tokio::test]
    async fn test_sales_fan_out_to_three_buckets() {
        let store = Arc::new(MemoryStore::new());
        let insights = InsightsAggregator::new(store.clone());

        let records = insights
            .merge_sales(Uuid::new_v4(), &order(dec!(19.99)))
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key.render(), "date#2024-05-01");
        assert_eq!(records[1].key.render(), "week#2024-W18");
        assert_eq!(records[2].key.render(), "month#2024-05");
        for record in &records {
            assert_eq!(record.total_amount.value(), dec!(19.99));
        }
    }

    #[tokio::test]
    async fn test_sales_merges_sum_exactly() {
        let store = Arc::new(MemoryStore::new());
        let insights = InsightsAggregator::new(store.clone());

        for amount in [dec!(19.99), dec!(49.99), dec!(9.99)] {
            insights
                .merge_sales(Uuid::new_v4(), &order(amount))
                .await
                .unwrap();
        }

        let daily = store.scan_metrics(Dimension::Date).await.unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].total_amount.value(), dec!(79.97));
        assert_eq!(daily[0].transaction_count, 3);
    }

    #[tokio::test]
    async fn test_cohort_merge() {
        let store = Arc::new(MemoryStore::new());
        let insights = InsightsAggregator::new(store.clone());

        let detail = CustomerAnalyzedDetail {
            customer_id: "cust_1001".to_string(),
            customer_type: CustomerType::Repeat,
            cohort: "2024-05".to_string(),
            total_spent: dec!(320.50),
            total_purchases: 4,
            average_order_value: dec!(80.13),
            purchase_categories: vec!["clothing".to_string()],
            last_purchase_at: Utc::now(),
            last_purchase_amount: dec!(20.00),
            payment_method: "paypal".to_string(),
            shipping_state: "CA".to_string(),
        };

        let record = insights
            .merge_cohort(Uuid::new_v4(), &detail)
            .await
            .unwrap();

        assert_eq!(record.key.render(), "cohort#2024-05");
        assert_eq!(record.customer_count, 1);
        assert_eq!(record.repeat_customers, 1);
        assert_eq!(record.new_customers, 0);
        assert_eq!(record.total_amount.value(), dec!(320.50));
    }
}
