//! Database module
//!
//! Connectivity check and schema bootstrap for the Postgres store.

use sqlx::PgPool;

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Create the store's tables when they don't exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    const STATEMENTS: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS metric_aggregates (
            metric_key        TEXT PRIMARY KEY,
            dimension         TEXT NOT NULL,
            bucket            TEXT NOT NULL,
            total_amount      NUMERIC NOT NULL DEFAULT 0,
            transaction_count BIGINT NOT NULL DEFAULT 0,
            item_count        BIGINT NOT NULL DEFAULT 0,
            customer_count    BIGINT NOT NULL DEFAULT 0,
            repeat_customers  BIGINT NOT NULL DEFAULT 0,
            new_customers     BIGINT NOT NULL DEFAULT 0,
            tags              TEXT[] NOT NULL DEFAULT '{}',
            created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_metric_aggregates_dimension
            ON metric_aggregates (dimension, bucket)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS processed_events (
            event_id   UUID NOT NULL,
            scope      TEXT NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (event_id, scope)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS customer_profiles (
            customer_id          TEXT PRIMARY KEY,
            cohort               TEXT NOT NULL,
            customer_type        TEXT NOT NULL,
            total_purchases      BIGINT NOT NULL,
            total_spent          NUMERIC NOT NULL,
            average_order_value  NUMERIC NOT NULL,
            purchase_categories  TEXT[] NOT NULL DEFAULT '{}',
            first_purchase_at    TIMESTAMPTZ NOT NULL,
            last_purchase_at     TIMESTAMPTZ NOT NULL,
            last_purchase_amount NUMERIC NOT NULL,
            payment_method       TEXT NOT NULL,
            shipping_state       TEXT NOT NULL,
            segment              TEXT NOT NULL,
            created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS inventory_status (
            product_id       TEXT PRIMARY KEY,
            product_name     TEXT NOT NULL,
            category         TEXT NOT NULL,
            stock_level      BIGINT NOT NULL,
            units_sold_total BIGINT NOT NULL,
            status           TEXT NOT NULL,
            created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id         UUID PRIMARY KEY,
            kind       TEXT NOT NULL,
            subject    TEXT NOT NULL,
            message    TEXT NOT NULL,
            recipient  TEXT NOT NULL,
            status     TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_notifications_kind_created
            ON notifications (kind, created_at DESC)
        "#,
    ];

    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec![
        "metric_aggregates",
        "processed_events",
        "customer_profiles",
        "inventory_status",
        "notifications",
    ];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
