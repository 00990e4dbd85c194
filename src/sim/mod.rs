//! Transaction simulator
//!
//! Background job publishing random purchase transactions on an interval,
//! for demos and load exercises. Prices come from a fixed catalog and stay
//! exact decimals end to end.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use tokio::time::interval;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::domain::{EventEnvelope, EventKind, LineItem, PurchaseDetail, ShippingAddress};

struct CatalogProduct {
    id: &'static str,
    name: &'static str,
    price: &'static str,
    category: &'static str,
}

const CATALOG: &[CatalogProduct] = &[
    CatalogProduct { id: "p1001", name: "T-Shirt", price: "19.99", category: "clothing" },
    CatalogProduct { id: "p1002", name: "Jeans", price: "49.99", category: "clothing" },
    CatalogProduct { id: "p1003", name: "Sneakers", price: "79.99", category: "footwear" },
    CatalogProduct { id: "p1004", name: "Backpack", price: "39.99", category: "accessories" },
    CatalogProduct { id: "p1005", name: "Hat", price: "14.99", category: "accessories" },
    CatalogProduct { id: "p1006", name: "Watch", price: "99.99", category: "accessories" },
    CatalogProduct { id: "p1007", name: "Socks", price: "9.99", category: "clothing" },
    CatalogProduct { id: "p1008", name: "Headphones", price: "29.99", category: "electronics" },
];

const PAYMENT_METHODS: &[&str] = &["credit_card", "paypal", "apple_pay"];

const STREETS: &[&str] = &["Main St", "Broadway", "Park Ave", "Elm St", "Oak Rd"];

const CITIES: &[&str] = &[
    "New York", "Los Angeles", "Chicago", "Seattle", "Austin", "Denver", "Boston", "Miami",
];

const STATES: &[&str] = &["NY", "CA", "IL", "WA", "TX", "CO", "MA", "FL"];

/// Generate one random purchase transaction.
pub fn generate_transaction() -> PurchaseDetail {
    let mut rng = rand::thread_rng();

    let num_items = rng.gen_range(1..=5);
    let items: Vec<LineItem> = (0..num_items)
        .map(|_| {
            let product = CATALOG.choose(&mut rng).expect("catalog is non-empty");
            LineItem {
                product_id: product.id.to_string(),
                product_name: product.name.to_string(),
                category: product.category.to_string(),
                price: Decimal::from_str(product.price).expect("valid catalog price"),
                quantity: rng.gen_range(1..=3),
            }
        })
        .collect();

    let total_amount: Decimal = items
        .iter()
        .map(|item| item.price * Decimal::from(item.quantity))
        .sum();

    PurchaseDetail {
        transaction_id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        customer_id: format!("cust_{}", rng.gen_range(1000..=9999)),
        items,
        total_amount,
        payment_method: PAYMENT_METHODS
            .choose(&mut rng)
            .expect("payment methods are non-empty")
            .to_string(),
        shipping_address: ShippingAddress {
            street: format!(
                "{} {}",
                rng.gen_range(100..=999),
                STREETS.choose(&mut rng).expect("streets are non-empty")
            ),
            city: CITIES
                .choose(&mut rng)
                .expect("cities are non-empty")
                .to_string(),
            state: STATES
                .choose(&mut rng)
                .expect("states are non-empty")
                .to_string(),
            zip: format!("{}", rng.gen_range(10000..=99999)),
        },
    }
}

/// Publishes a random transaction on every tick.
pub struct TransactionSimulator {
    bus: Arc<dyn EventBus>,
    tick: Duration,
}

impl TransactionSimulator {
    pub fn new(bus: Arc<dyn EventBus>, tick: Duration) -> Self {
        Self { bus, tick }
    }

    /// Start the simulator in the background.
    /// Returns a handle that can be used to abort it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(interval = ?self.tick, "Transaction simulator started");

        let mut ticker = interval(self.tick);
        loop {
            ticker.tick().await;

            let transaction = generate_transaction();
            let envelope = match EventEnvelope::new(EventKind::Purchase, &transaction) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to build purchase event");
                    continue;
                }
            };

            tracing::debug!(
                transaction_id = %transaction.transaction_id,
                total_amount = %transaction.total_amount,
                "Simulated transaction"
            );

            if let Err(e) = self.bus.publish(envelope).await {
                tracing::error!(error = %e, "Failed to publish simulated transaction");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_transaction_is_consistent() {
        for _ in 0..100 {
            let txn = generate_transaction();

            assert!(!txn.items.is_empty() && txn.items.len() <= 5);
            for item in &txn.items {
                assert!((1..=3).contains(&item.quantity));
                assert!(CATALOG.iter().any(|p| p.id == item.product_id));
            }

            let expected: Decimal = txn
                .items
                .iter()
                .map(|i| i.price * Decimal::from(i.quantity))
                .sum();
            assert_eq!(txn.total_amount, expected);

            assert!(PAYMENT_METHODS.contains(&txn.payment_method.as_str()));
            assert!(STATES.contains(&txn.shipping_address.state.as_str()));
            assert!(txn.customer_id.starts_with("cust_"));
        }
    }

    #[tokio::test]
    async fn test_generated_transaction_routes_as_purchase() {
        let txn = generate_transaction();
        let envelope = EventEnvelope::new(EventKind::Purchase, &txn).unwrap();
        assert_eq!(envelope.kind(), Some(EventKind::Purchase));

        let parsed: PurchaseDetail = envelope.parse_detail().unwrap();
        assert_eq!(parsed.transaction_id, txn.transaction_id);
        assert_eq!(parsed.total_amount, txn.total_amount);
    }
}
