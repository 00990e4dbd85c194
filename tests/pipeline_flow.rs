//! End-to-end pipeline tests against the in-memory backends.

use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use shopstream::domain::{EventEnvelope, EventKind, InventoryAlertDetail};
use shopstream::metrics::{Dimension, MetricKey, NotificationKind, Store};

mod common;

use common::{at, line_item, purchase, purchase_event, Harness};

#[tokio::test]
async fn test_purchase_flows_through_all_aggregates() {
    let mut harness = Harness::new();

    let detail = purchase(
        "t-1",
        "cust_1001",
        at(2024, 5, 1),
        "NY",
        vec![
            line_item("p1001", "T-Shirt", "clothing", "19.99", 2),
            line_item("p1003", "Sneakers", "footwear", "79.99", 1),
        ],
    );
    harness.process_to_completion(purchase_event(&detail)).await;

    // Sales metrics fanned out to all three time buckets
    let daily = harness
        .store
        .get_metric(&MetricKey::new(Dimension::Date, "2024-05-01"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(daily.total_amount.value(), dec!(119.97));
    assert_eq!(daily.transaction_count, 1);
    assert_eq!(daily.item_count, 3);
    assert_eq!(daily.tags.len(), 2);

    assert!(harness
        .store
        .get_metric(&MetricKey::new(Dimension::Week, "2024-W18"))
        .await
        .unwrap()
        .is_some());
    assert!(harness
        .store
        .get_metric(&MetricKey::new(Dimension::Month, "2024-05"))
        .await
        .unwrap()
        .is_some());

    // Customer profile and cohort insight
    let profile = harness.store.get_customer("cust_1001").await.unwrap().unwrap();
    assert_eq!(profile.total_purchases, 1);
    assert_eq!(profile.cohort, "2024-05");

    let cohort = harness
        .store
        .get_metric(&MetricKey::cohort("2024-05"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cohort.customer_count, 1);
    assert_eq!(cohort.new_customers, 1);

    // Inventory decremented per product
    let shirt = harness.store.get_inventory("p1001").await.unwrap().unwrap();
    assert_eq!(shirt.stock_level, 98);
    let sneakers = harness.store.get_inventory("p1003").await.unwrap().unwrap();
    assert_eq!(sneakers.stock_level, 99);

    // Order confirmation notification recorded
    let confirmations = harness
        .store
        .list_notifications(Some(NotificationKind::OrderConfirmation), 10)
        .await
        .unwrap();
    assert_eq!(confirmations.len(), 1);
    assert!(confirmations[0].message.contains("$119.97"));

    // Marketing profile exported for the analyzed customer
    assert_eq!(harness.objects.len(), 1);
}

#[tokio::test]
async fn test_monetary_totals_stay_exact() {
    let mut harness = Harness::new();

    for (i, price) in ["19.99", "49.99", "9.99"].iter().enumerate() {
        let detail = purchase(
            &format!("t-{i}"),
            &format!("cust_{i}"),
            at(2024, 5, 1),
            "CA",
            vec![line_item("p1001", "T-Shirt", "clothing", price, 1)],
        );
        harness.process_to_completion(purchase_event(&detail)).await;
    }

    let daily = harness
        .store
        .get_metric(&MetricKey::new(Dimension::Date, "2024-05-01"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(daily.total_amount.value(), dec!(79.97));
    assert_eq!(daily.transaction_count, 3);
}

#[tokio::test]
async fn test_commutative_merges_across_orders() {
    let prices = ["19.99", "49.99", "9.99"];
    let orders: [[usize; 3]; 3] = [[0, 1, 2], [2, 0, 1], [1, 2, 0]];

    let mut totals = Vec::new();
    for order in orders {
        let mut harness = Harness::new();
        for idx in order {
            let detail = purchase(
                &format!("t-{idx}"),
                &format!("cust_{idx}"),
                at(2024, 5, 1),
                "CA",
                vec![line_item("p1001", "T-Shirt", "clothing", prices[idx], 1)],
            );
            harness.process_to_completion(purchase_event(&detail)).await;
        }
        let daily = harness
            .store
            .get_metric(&MetricKey::new(Dimension::Date, "2024-05-01"))
            .await
            .unwrap()
            .unwrap();
        totals.push((daily.total_amount.value(), daily.transaction_count));
    }

    assert!(totals.iter().all(|t| *t == (dec!(79.97), 3)));
}

#[tokio::test]
async fn test_threshold_crossing_publishes_one_alert_and_notification() {
    let mut harness = Harness::new();

    // 100 -> 25
    let detail = purchase(
        "t-1",
        "cust_1001",
        Utc::now(),
        "NY",
        vec![line_item("p1003", "Sneakers", "footwear", "79.99", 75)],
    );
    harness.process_to_completion(purchase_event(&detail)).await;
    assert!(harness
        .bus
        .published_of_kind(EventKind::InventoryAlert)
        .is_empty());

    // 25 -> 24: stays normal
    let detail = purchase(
        "t-2",
        "cust_1002",
        Utc::now(),
        "NY",
        vec![line_item("p1003", "Sneakers", "footwear", "79.99", 1)],
    );
    harness.process_to_completion(purchase_event(&detail)).await;
    assert!(harness
        .bus
        .published_of_kind(EventKind::InventoryAlert)
        .is_empty());

    // 24 -> 15: one crossing
    let detail = purchase(
        "t-3",
        "cust_1003",
        Utc::now(),
        "NY",
        vec![line_item("p1003", "Sneakers", "footwear", "79.99", 9)],
    );
    harness.process_to_completion(purchase_event(&detail)).await;

    let alerts = harness.bus.published_of_kind(EventKind::InventoryAlert);
    assert_eq!(alerts.len(), 1);
    let alert: InventoryAlertDetail = alerts[0].parse_detail().unwrap();
    assert_eq!(alert.stock_level, 15);

    // The alert was routed on to the notification log
    let notifications = harness
        .store
        .list_notifications(Some(NotificationKind::InventoryAlert), 10)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].message.contains("has low stock: 15"));

    // Already low: a further sale does not re-alert
    let detail = purchase(
        "t-4",
        "cust_1004",
        Utc::now(),
        "NY",
        vec![line_item("p1003", "Sneakers", "footwear", "79.99", 5)],
    );
    harness.process_to_completion(purchase_event(&detail)).await;
    assert_eq!(
        harness.bus.published_of_kind(EventKind::InventoryAlert).len(),
        1
    );
}

#[tokio::test]
async fn test_partial_batch_resilience() {
    let mut harness = Harness::new();

    let good = |i: usize| {
        purchase_event(&purchase(
            &format!("t-{i}"),
            &format!("cust_{i}"),
            at(2024, 5, 1),
            "CA",
            vec![line_item("p1001", "T-Shirt", "clothing", "19.99", 1)],
        ))
    };

    let malformed = EventEnvelope {
        event_id: Uuid::new_v4(),
        source: "com.ecommerce.transactions".to_string(),
        detail_type: "purchase".to_string(),
        timestamp: Utc::now(),
        detail: serde_json::json!({ "transaction_id": "t-bad" }),
    };

    let batch = vec![good(1), good(2), malformed, good(4), good(5)];
    let report = harness.router.process_batch(&batch).await;
    harness.drain().await;

    assert_eq!(report.handled, 4);
    assert_eq!(report.skipped, 1);
    assert!(report.failures.is_empty());

    let daily = harness
        .store
        .get_metric(&MetricKey::new(Dimension::Date, "2024-05-01"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(daily.transaction_count, 4);
    assert_eq!(daily.total_amount.value(), dec!(79.96));
}

#[tokio::test]
async fn test_redelivered_purchase_does_not_double_count() {
    let mut harness = Harness::new();

    let detail = purchase(
        "t-1",
        "cust_1001",
        at(2024, 5, 1),
        "NY",
        vec![line_item("p1001", "T-Shirt", "clothing", "19.99", 1)],
    );
    let event = purchase_event(&detail);

    harness.process_to_completion(event.clone()).await;
    // Transport redelivers the same envelope
    harness.process_to_completion(event).await;

    let profile = harness.store.get_customer("cust_1001").await.unwrap().unwrap();
    assert_eq!(profile.total_purchases, 1);

    let shirt = harness.store.get_inventory("p1001").await.unwrap().unwrap();
    assert_eq!(shirt.stock_level, 99);
}

#[tokio::test]
async fn test_repeat_customer_reaches_loyalty_notification() {
    let mut harness = Harness::new();

    for i in 0..4 {
        let detail = purchase(
            &format!("t-{i}"),
            "cust_1001",
            at(2024, 5, 1 + i),
            "NY",
            vec![line_item("p1008", "Headphones", "electronics", "29.99", 1)],
        );
        harness.process_to_completion(purchase_event(&detail)).await;
    }

    // 4th purchase: repeat customer with > 3 purchases
    let loyalty = harness
        .store
        .list_notifications(Some(NotificationKind::CustomerLoyalty), 10)
        .await
        .unwrap();
    assert_eq!(loyalty.len(), 1);
    assert!(loyalty[0].message.contains("4 purchases"));

    // Cohort tallies one new observation and three repeats
    let cohort = harness
        .store
        .get_metric(&MetricKey::cohort("2024-05"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cohort.customer_count, 4);
    assert_eq!(cohort.new_customers, 1);
    assert_eq!(cohort.repeat_customers, 3);
}

#[tokio::test]
async fn test_unroutable_events_are_ignored() {
    let mut harness = Harness::new();

    let unknown = EventEnvelope {
        event_id: Uuid::new_v4(),
        source: "com.ecommerce.orders".to_string(),
        detail_type: "order_cancelled".to_string(),
        timestamp: Utc::now(),
        detail: serde_json::json!({ "transaction_id": "t-1" }),
    };

    let report = harness.router.process_batch(&[unknown]).await;
    assert_eq!(report.ignored, 1);
    assert!(report.into_result().is_ok());
    assert!(harness.bus.published().is_empty());
}
