//! Notification Service
//!
//! Fire-and-forget notifications derived from pipeline events. Records are
//! write-once; the log exists for audit and dashboard listing only. In a
//! full deployment delivery would go through an email/SMS gateway; here
//! the "send" is the log entry itself.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{CustomerAnalyzedDetail, CustomerType, InventoryAlertDetail, OrderProcessedDetail};
use crate::metrics::{NotificationKind, NotificationRecord, Store, StoreError};

/// Purchase count above which a repeat customer gets the loyalty message
/// (strictly greater).
const LOYALTY_MESSAGE_PURCHASES: i64 = 3;

/// Writes notification records for events that warrant one.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn Store>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Low-stock alert for the procurement mailbox.
    pub async fn inventory_alert(
        &self,
        detail: &InventoryAlertDetail,
    ) -> Result<NotificationRecord, StoreError> {
        let message = format!(
            "INVENTORY ALERT: Product {} (ID: {}) has low stock: {}. Please reorder.",
            detail.product_name, detail.product_id, detail.stock_level
        );

        self.record(
            NotificationKind::InventoryAlert,
            format!("Low Inventory: {}", detail.product_name),
            message,
            "inventory@example.com".to_string(),
        )
        .await
    }

    /// Order confirmation for the purchasing customer.
    pub async fn order_confirmation(
        &self,
        detail: &OrderProcessedDetail,
    ) -> Result<NotificationRecord, StoreError> {
        let message = format!(
            "Thank you for your order #{}! Your total is ${:.2}.",
            detail.transaction_id, detail.total_amount
        );
        tracing::info!(
            customer_id = %detail.customer_id,
            transaction_id = %detail.transaction_id,
            "Order confirmation sent"
        );

        self.record(
            NotificationKind::OrderConfirmation,
            format!("Order Confirmation #{}", detail.transaction_id),
            message,
            format!("customer_{}@example.com", detail.customer_id),
        )
        .await
    }

    /// Loyalty message for qualifying repeat customers. Returns `None` when
    /// the customer does not qualify.
    pub async fn customer_loyalty(
        &self,
        detail: &CustomerAnalyzedDetail,
    ) -> Result<Option<NotificationRecord>, StoreError> {
        if detail.customer_type != CustomerType::Repeat
            || detail.total_purchases <= LOYALTY_MESSAGE_PURCHASES
        {
            return Ok(None);
        }

        let message = format!(
            "Thank you for being a loyal customer! You've made {} purchases \
             with us totaling ${:.2}. As a token of our appreciation, \
             here's a 10% discount on your next purchase. Use code LOYAL10.",
            detail.total_purchases, detail.total_spent
        );

        let record = self
            .record(
                NotificationKind::CustomerLoyalty,
                "Thank You for Your Loyalty!".to_string(),
                message,
                format!("customer_{}@example.com", detail.customer_id),
            )
            .await?;

        Ok(Some(record))
    }

    async fn record(
        &self,
        kind: NotificationKind,
        subject: String,
        message: String,
        recipient: String,
    ) -> Result<NotificationRecord, StoreError> {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            kind,
            subject,
            message,
            recipient,
            status: "sent".to_string(),
            created_at: Utc::now(),
        };

        self.store.record_notification(&record).await?;
        Ok(record)
    }
}
