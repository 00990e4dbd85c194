//! Postgres-backed store
//!
//! Metric merges are single upsert statements: the additions happen
//! server-side (`total_amount = metric_aggregates.total_amount +
//! EXCLUDED.total_amount`), so concurrent deltas against one bucket can
//! never lose an increment. Customer profiles and inventory need the prior
//! state and derived labels, so they run inside a transaction holding the
//! row lock (`SELECT ... FOR UPDATE`) with a bounded retry on first-insert
//! races. Applied event ids are registered in `processed_events` within
//! the same transaction as the merge they guard.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::classify::{CustomerSegment, StockStatus};
use crate::domain::{CustomerType, Money};

use super::{
    AggregateRecord, CustomerProfile, CustomerUpdate, Dimension, InventoryFilter, InventoryRecord,
    ItemSale, MetricDelta, MetricKey, NotificationKind, NotificationRecord, StockChange, Store,
    StoreError,
};

const MAX_RETRIES: u32 = 3;

type MetricRow = (
    String,
    String,
    Decimal,
    i64,
    i64,
    i64,
    i64,
    i64,
    Vec<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

type ProfileRow = (
    String,
    String,
    String,
    i64,
    Decimal,
    Decimal,
    Vec<String>,
    DateTime<Utc>,
    DateTime<Utc>,
    Decimal,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

type InventoryRow = (
    String,
    String,
    String,
    i64,
    i64,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// Store implementation on PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register an event id for a merge scope. Returns false when the event
    /// was already applied to that scope.
    async fn claim_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        scope: &str,
    ) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, scope)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(scope)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn fetch_metric(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &MetricKey,
    ) -> Result<Option<AggregateRecord>, StoreError> {
        let row: Option<MetricRow> = sqlx::query_as(
            r#"
            SELECT dimension, bucket, total_amount, transaction_count, item_count,
                   customer_count, repeat_customers, new_customers, tags,
                   created_at, updated_at
            FROM metric_aggregates
            WHERE metric_key = $1
            "#,
        )
        .bind(key.render())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(decode_metric).transpose()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn merge_metric(
        &self,
        key: &MetricKey,
        delta: &MetricDelta,
    ) -> Result<AggregateRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let scope = key.render();
        if !self.claim_event(&mut tx, delta.event_id, &scope).await? {
            // Redelivered event: return current state untouched
            if let Some(record) = self.fetch_metric(&mut tx, key).await? {
                tx.commit().await?;
                return Ok(record);
            }
        }

        let tags: Vec<String> = delta.tags.iter().cloned().collect();
        let row: MetricRow = sqlx::query_as(
            r#"
            INSERT INTO metric_aggregates (
                metric_key, dimension, bucket, total_amount, transaction_count,
                item_count, customer_count, repeat_customers, new_customers, tags
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (metric_key) DO UPDATE SET
                total_amount = metric_aggregates.total_amount + EXCLUDED.total_amount,
                transaction_count = metric_aggregates.transaction_count + EXCLUDED.transaction_count,
                item_count = metric_aggregates.item_count + EXCLUDED.item_count,
                customer_count = metric_aggregates.customer_count + EXCLUDED.customer_count,
                repeat_customers = metric_aggregates.repeat_customers + EXCLUDED.repeat_customers,
                new_customers = metric_aggregates.new_customers + EXCLUDED.new_customers,
                tags = ARRAY(
                    SELECT DISTINCT tag
                    FROM unnest(metric_aggregates.tags || EXCLUDED.tags) AS tag
                    ORDER BY tag
                ),
                updated_at = NOW()
            RETURNING dimension, bucket, total_amount, transaction_count, item_count,
                      customer_count, repeat_customers, new_customers, tags,
                      created_at, updated_at
            "#,
        )
        .bind(key.render())
        .bind(key.dimension.as_str())
        .bind(&key.bucket)
        .bind(delta.amount.value())
        .bind(delta.transaction_count)
        .bind(delta.item_count)
        .bind(delta.customer_count)
        .bind(delta.repeat_customers)
        .bind(delta.new_customers)
        .bind(&tags)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        decode_metric(row)
    }

    async fn get_metric(&self, key: &MetricKey) -> Result<Option<AggregateRecord>, StoreError> {
        let row: Option<MetricRow> = sqlx::query_as(
            r#"
            SELECT dimension, bucket, total_amount, transaction_count, item_count,
                   customer_count, repeat_customers, new_customers, tags,
                   created_at, updated_at
            FROM metric_aggregates
            WHERE metric_key = $1
            "#,
        )
        .bind(key.render())
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_metric).transpose()
    }

    async fn scan_metrics(&self, dimension: Dimension) -> Result<Vec<AggregateRecord>, StoreError> {
        let rows: Vec<MetricRow> = sqlx::query_as(
            r#"
            SELECT dimension, bucket, total_amount, transaction_count, item_count,
                   customer_count, repeat_customers, new_customers, tags,
                   created_at, updated_at
            FROM metric_aggregates
            WHERE dimension = $1
            ORDER BY bucket ASC
            "#,
        )
        .bind(dimension.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_metric).collect()
    }

    async fn merge_customer(
        &self,
        update: &CustomerUpdate,
    ) -> Result<CustomerProfile, StoreError> {
        let scope = format!("customer#{}", update.customer_id);

        for attempt in 0..MAX_RETRIES {
            match self.try_merge_customer(update, &scope).await {
                Ok(profile) => return Ok(profile),
                Err(StoreError::Database(e))
                    if is_unique_violation(&e) && attempt < MAX_RETRIES - 1 =>
                {
                    // Lost the first-insert race; the row exists now, retry
                    // takes the locked-update path
                    tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                    tracing::warn!(
                        customer_id = %update.customer_id,
                        "First-insert race on customer profile, retrying (attempt {}/{})",
                        attempt + 1,
                        MAX_RETRIES
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("retry loop either returns or propagates")
    }

    async fn get_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<CustomerProfile>, StoreError> {
        let row: Option<ProfileRow> = sqlx::query_as(
            r#"
            SELECT customer_id, cohort, customer_type, total_purchases, total_spent,
                   average_order_value, purchase_categories, first_purchase_at,
                   last_purchase_at, last_purchase_amount, payment_method,
                   shipping_state, segment, created_at, updated_at
            FROM customer_profiles
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_profile).transpose()
    }

    async fn apply_sale(&self, sale: &ItemSale) -> Result<StockChange, StoreError> {
        let scope = format!("product#{}", sale.product_id);

        for attempt in 0..MAX_RETRIES {
            match self.try_apply_sale(sale, &scope).await {
                Ok(change) => return Ok(change),
                Err(StoreError::Database(e))
                    if is_unique_violation(&e) && attempt < MAX_RETRIES - 1 =>
                {
                    tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                    tracing::warn!(
                        product_id = %sale.product_id,
                        "First-insert race on inventory record, retrying (attempt {}/{})",
                        attempt + 1,
                        MAX_RETRIES
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("retry loop either returns or propagates")
    }

    async fn get_inventory(
        &self,
        product_id: &str,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let row: Option<InventoryRow> = sqlx::query_as(
            r#"
            SELECT product_id, product_name, category, stock_level, units_sold_total,
                   status, created_at, updated_at
            FROM inventory_status
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_inventory).transpose()
    }

    async fn scan_inventory(
        &self,
        filter: &InventoryFilter,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows: Vec<InventoryRow> = sqlx::query_as(
            r#"
            SELECT product_id, product_name, category, stock_level, units_sold_total,
                   status, created_at, updated_at
            FROM inventory_status
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR category = $2)
            ORDER BY product_id ASC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.category.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_inventory).collect()
    }

    async fn record_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, kind, subject, message, recipient, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.kind.as_str())
        .bind(&record.subject)
        .bind(&record.message)
        .bind(&record.recipient)
        .bind(&record.status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_notifications(
        &self,
        kind: Option<NotificationKind>,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let rows: Vec<(Uuid, String, String, String, String, String, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT id, kind, subject, message, recipient, status, created_at
                FROM notifications
                WHERE ($1::TEXT IS NULL OR kind = $1)
                ORDER BY created_at DESC
                LIMIT $2
                "#,
            )
            .bind(kind.map(|k| k.as_str()))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(id, kind, subject, message, recipient, status, created_at)| {
                Ok(NotificationRecord {
                    id,
                    kind: decode_notification_kind(&kind)?,
                    subject,
                    message,
                    recipient,
                    status,
                    created_at,
                })
            })
            .collect()
    }
}

impl PgStore {
    async fn try_merge_customer(
        &self,
        update: &CustomerUpdate,
        scope: &str,
    ) -> Result<CustomerProfile, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row: Option<ProfileRow> = sqlx::query_as(
            r#"
            SELECT customer_id, cohort, customer_type, total_purchases, total_spent,
                   average_order_value, purchase_categories, first_purchase_at,
                   last_purchase_at, last_purchase_amount, payment_method,
                   shipping_state, segment, created_at, updated_at
            FROM customer_profiles
            WHERE customer_id = $1
            FOR UPDATE
            "#,
        )
        .bind(&update.customer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let fresh = self.claim_event(&mut tx, update.event_id, scope).await?;

        let profile = match row {
            Some(row) => {
                let mut profile = decode_profile(row)?;
                if fresh {
                    profile
                        .absorb(update, now)
                        .map_err(|e| StoreError::InvalidDelta(e.to_string()))?;
                    self.write_profile(&mut tx, &profile, false).await?;
                }
                profile
            }
            None => {
                let profile = CustomerProfile::first_purchase(update, now);
                self.write_profile(&mut tx, &profile, true).await?;
                profile
            }
        };

        tx.commit().await?;
        Ok(profile)
    }

    async fn write_profile(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        profile: &CustomerProfile,
        insert: bool,
    ) -> Result<(), StoreError> {
        let categories: Vec<String> = profile.purchase_categories.iter().cloned().collect();

        if insert {
            sqlx::query(
                r#"
                INSERT INTO customer_profiles (
                    customer_id, cohort, customer_type, total_purchases, total_spent,
                    average_order_value, purchase_categories, first_purchase_at,
                    last_purchase_at, last_purchase_amount, payment_method,
                    shipping_state, segment, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(&profile.customer_id)
            .bind(&profile.cohort)
            .bind(profile.customer_type.to_string())
            .bind(profile.total_purchases)
            .bind(profile.total_spent.value())
            .bind(profile.average_order_value)
            .bind(&categories)
            .bind(profile.first_purchase_at)
            .bind(profile.last_purchase_at)
            .bind(profile.last_purchase_amount.value())
            .bind(&profile.payment_method)
            .bind(&profile.shipping_state)
            .bind(profile.segment.as_str())
            .bind(profile.created_at)
            .bind(profile.updated_at)
            .execute(&mut **tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE customer_profiles SET
                    customer_type = $2, total_purchases = $3, total_spent = $4,
                    average_order_value = $5, purchase_categories = $6,
                    last_purchase_at = $7, last_purchase_amount = $8,
                    payment_method = $9, shipping_state = $10, segment = $11,
                    updated_at = $12
                WHERE customer_id = $1
                "#,
            )
            .bind(&profile.customer_id)
            .bind(profile.customer_type.to_string())
            .bind(profile.total_purchases)
            .bind(profile.total_spent.value())
            .bind(profile.average_order_value)
            .bind(&categories)
            .bind(profile.last_purchase_at)
            .bind(profile.last_purchase_amount.value())
            .bind(&profile.payment_method)
            .bind(&profile.shipping_state)
            .bind(profile.segment.as_str())
            .bind(profile.updated_at)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn try_apply_sale(
        &self,
        sale: &ItemSale,
        scope: &str,
    ) -> Result<StockChange, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row: Option<InventoryRow> = sqlx::query_as(
            r#"
            SELECT product_id, product_name, category, stock_level, units_sold_total,
                   status, created_at, updated_at
            FROM inventory_status
            WHERE product_id = $1
            FOR UPDATE
            "#,
        )
        .bind(&sale.product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let fresh = self.claim_event(&mut tx, sale.event_id, scope).await?;

        let mut record = match row {
            Some(row) => decode_inventory(row)?,
            None => InventoryRecord::seed(sale, now),
        };
        let previous_stock = record.stock_level;
        let previous_status = record.status;

        if fresh {
            record.apply(sale, now);
        }

        sqlx::query(
            r#"
            INSERT INTO inventory_status (
                product_id, product_name, category, stock_level, units_sold_total,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (product_id) DO UPDATE SET
                product_name = EXCLUDED.product_name,
                category = EXCLUDED.category,
                stock_level = EXCLUDED.stock_level,
                units_sold_total = EXCLUDED.units_sold_total,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.product_id)
        .bind(&record.product_name)
        .bind(&record.category)
        .bind(record.stock_level)
        .bind(record.units_sold_total)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(StockChange {
            record,
            previous_stock,
            previous_status,
        })
    }
}

fn decode_metric(row: MetricRow) -> Result<AggregateRecord, StoreError> {
    let (
        dimension,
        bucket,
        total_amount,
        transaction_count,
        item_count,
        customer_count,
        repeat_customers,
        new_customers,
        tags,
        created_at,
        updated_at,
    ) = row;

    let dimension = Dimension::from_str(&dimension).map_err(StoreError::Corrupt)?;

    Ok(AggregateRecord {
        key: MetricKey::new(dimension, bucket),
        total_amount: Money::from_stored(total_amount),
        transaction_count,
        item_count,
        customer_count,
        repeat_customers,
        new_customers,
        tags: tags.into_iter().collect(),
        created_at,
        updated_at,
    })
}

fn decode_profile(row: ProfileRow) -> Result<CustomerProfile, StoreError> {
    let (
        customer_id,
        cohort,
        customer_type,
        total_purchases,
        total_spent,
        average_order_value,
        purchase_categories,
        first_purchase_at,
        last_purchase_at,
        last_purchase_amount,
        payment_method,
        shipping_state,
        segment,
        created_at,
        updated_at,
    ) = row;

    Ok(CustomerProfile {
        customer_id,
        cohort,
        customer_type: decode_customer_type(&customer_type)?,
        total_purchases,
        total_spent: Money::from_stored(total_spent),
        average_order_value,
        purchase_categories: purchase_categories.into_iter().collect(),
        first_purchase_at,
        last_purchase_at,
        last_purchase_amount: Money::from_stored(last_purchase_amount),
        payment_method,
        shipping_state,
        segment: decode_segment(&segment)?,
        created_at,
        updated_at,
    })
}

fn decode_inventory(row: InventoryRow) -> Result<InventoryRecord, StoreError> {
    let (
        product_id,
        product_name,
        category,
        stock_level,
        units_sold_total,
        status,
        created_at,
        updated_at,
    ) = row;

    Ok(InventoryRecord {
        product_id,
        product_name,
        category,
        stock_level,
        units_sold_total,
        status: decode_stock_status(&status)?,
        created_at,
        updated_at,
    })
}

fn decode_customer_type(value: &str) -> Result<CustomerType, StoreError> {
    match value {
        "new" => Ok(CustomerType::New),
        "repeat" => Ok(CustomerType::Repeat),
        other => Err(StoreError::Corrupt(format!(
            "unknown customer type: {other}"
        ))),
    }
}

fn decode_segment(value: &str) -> Result<CustomerSegment, StoreError> {
    match value {
        "VIP" => Ok(CustomerSegment::Vip),
        "Frequent" => Ok(CustomerSegment::Frequent),
        "Loyal" => Ok(CustomerSegment::Loyal),
        "New" => Ok(CustomerSegment::New),
        other => Err(StoreError::Corrupt(format!("unknown segment: {other}"))),
    }
}

fn decode_stock_status(value: &str) -> Result<StockStatus, StoreError> {
    match value {
        "low" => Ok(StockStatus::Low),
        "normal" => Ok(StockStatus::Normal),
        other => Err(StoreError::Corrupt(format!(
            "unknown stock status: {other}"
        ))),
    }
}

fn decode_notification_kind(value: &str) -> Result<NotificationKind, StoreError> {
    match value {
        "inventory_alert" => Ok(NotificationKind::InventoryAlert),
        "order_confirmation" => Ok(NotificationKind::OrderConfirmation),
        "customer_loyalty" => Ok(NotificationKind::CustomerLoyalty),
        other => Err(StoreError::Corrupt(format!(
            "unknown notification kind: {other}"
        ))),
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}
