//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc::UnboundedReceiver;

use shopstream::bus::InMemoryEventBus;
use shopstream::domain::{
    EventEnvelope, EventKind, LineItem, PurchaseDetail, ShippingAddress,
};
use shopstream::metrics::memory::MemoryStore;
use shopstream::pipeline::Router;
use shopstream::report::InMemoryObjectStore;

/// Pipeline wired against in-memory backends.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<InMemoryEventBus>,
    pub objects: Arc<InMemoryObjectStore>,
    pub router: Router,
    events: UnboundedReceiver<EventEnvelope>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let events = bus.attach_consumer();
        let objects = Arc::new(InMemoryObjectStore::new("memory://reports"));
        let router = Router::new(store.clone(), bus.clone(), objects.clone());

        Self {
            store,
            bus,
            objects,
            router,
            events,
        }
    }

    /// Process one event and then everything it caused, until the bus is
    /// drained. Stands in for the transport fan-out between steps.
    pub async fn process_to_completion(&mut self, event: EventEnvelope) {
        self.router.process_batch(&[event]).await;
        self.drain().await;
    }

    /// Process every event currently queued on the bus, including the ones
    /// published while draining.
    pub async fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.router.process_batch(&[event]).await;
        }
    }
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

pub fn line_item(product_id: &str, name: &str, category: &str, price: &str, quantity: u32) -> LineItem {
    LineItem {
        product_id: product_id.to_string(),
        product_name: name.to_string(),
        category: category.to_string(),
        price: price.parse::<Decimal>().unwrap(),
        quantity,
    }
}

pub fn purchase(
    transaction_id: &str,
    customer_id: &str,
    timestamp: DateTime<Utc>,
    state: &str,
    items: Vec<LineItem>,
) -> PurchaseDetail {
    let total_amount = items
        .iter()
        .map(|i| i.price * Decimal::from(i.quantity))
        .sum();

    PurchaseDetail {
        transaction_id: transaction_id.to_string(),
        timestamp,
        customer_id: customer_id.to_string(),
        items,
        total_amount,
        payment_method: "credit_card".to_string(),
        shipping_address: ShippingAddress {
            street: "1 Main St".to_string(),
            city: "New York".to_string(),
            state: state.to_string(),
            zip: "10001".to_string(),
        },
    }
}

pub fn purchase_event(detail: &PurchaseDetail) -> EventEnvelope {
    EventEnvelope::new(EventKind::Purchase, detail).unwrap()
}
