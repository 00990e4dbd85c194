//! API Routes
//!
//! Read-side query endpoints over the aggregate store, plus report
//! generation. Queries return structured JSON; failures map through
//! `AppError` to `{error, error_code, details}` payloads.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::StockStatus;
use crate::error::AppError;
use crate::metrics::{
    AggregateRecord, Dimension, InventoryFilter, InventoryRecord, NotificationKind,
    NotificationRecord, Store,
};
use crate::report::{ReportFormat, ReportGenerator, ReportReceipt, ReportRequest, ReportType};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub reports: ReportGenerator,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, reports: ReportGenerator) -> Self {
        Self { store, reports }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesQuery {
    #[serde(default = "default_time_unit")]
    pub time_unit: String,
    #[serde(default = "default_period")]
    pub period: String,
}

fn default_time_unit() -> String {
    "day".to_string()
}

fn default_period() -> String {
    "last7".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesResponse {
    pub period: String,
    pub time_unit: String,
    pub data: Vec<AggregateRecord>,
}

#[derive(Debug, Deserialize)]
pub struct CustomersQuery {
    #[serde(default)]
    pub cohort: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CohortResponse {
    pub cohort: String,
    pub data: Option<AggregateRecord>,
}

#[derive(Debug, Serialize)]
pub struct CohortsResponse {
    pub cohorts: Vec<AggregateRecord>,
}

#[derive(Debug, Deserialize)]
pub struct InventoryQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    pub categories: std::collections::BTreeMap<String, Vec<InventoryRecord>>,
    pub total_items: usize,
}

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default = "default_notification_limit")]
    pub limit: usize,
}

fn default_notification_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<NotificationRecord>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub recent_sales: Vec<AggregateRecord>,
    pub customer_cohorts: Vec<AggregateRecord>,
    pub low_inventory_items: usize,
    pub recent_notifications: Vec<NotificationRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOptions {
    pub report_types: Vec<&'static str>,
    pub formats: Vec<&'static str>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api", get(dashboard_summary))
        .route("/api/sales", get(get_sales))
        .route("/api/customers", get(get_customers))
        .route("/api/inventory", get(get_inventory))
        .route("/api/notifications", get(get_notifications))
        .route("/api/reports", get(report_options).post(generate_report))
}

// =========================================================================
// GET /api/sales
// =========================================================================

/// Sales metrics for a time unit over a period
async fn get_sales(
    State(state): State<AppState>,
    Query(query): Query<SalesQuery>,
) -> Result<Json<SalesResponse>, AppError> {
    let data = sales_window(&state, &query.time_unit, &query.period, Utc::now()).await?;

    Ok(Json(SalesResponse {
        period: query.period,
        time_unit: query.time_unit,
        data,
    }))
}

/// Scan one sales dimension and keep buckets inside the period window.
///
/// Unknown time units fall back to daily, unknown periods to last7,
/// mirroring the dashboard's forgiving query contract.
async fn sales_window(
    state: &AppState,
    time_unit: &str,
    period: &str,
    now: DateTime<Utc>,
) -> Result<Vec<AggregateRecord>, AppError> {
    let dimension = match time_unit {
        "week" => Dimension::Week,
        "month" => Dimension::Month,
        _ => Dimension::Date,
    };

    let days = match period {
        "last30" => 30,
        "last12" => 365,
        _ => 7,
    };
    let start = now - chrono::Duration::days(days);
    let cutoff = match dimension {
        Dimension::Date => start.format("%Y-%m-%d").to_string(),
        Dimension::Week => start.format("%Y-W%W").to_string(),
        Dimension::Month | Dimension::Cohort => start.format("%Y-%m").to_string(),
    };

    // Bucket labels are zero-padded ISO forms; string comparison orders
    // them chronologically. scan_metrics returns them already sorted.
    let data = state
        .store
        .scan_metrics(dimension)
        .await?
        .into_iter()
        .filter(|r| r.key.bucket >= cutoff)
        .collect();

    Ok(data)
}

// =========================================================================
// GET /api/customers
// =========================================================================

/// Cohort insights: one cohort when `cohort` is given, all otherwise
async fn get_customers(
    State(state): State<AppState>,
    Query(query): Query<CustomersQuery>,
) -> Result<Response, AppError> {
    match query.cohort {
        Some(cohort) => {
            let data = state
                .store
                .get_metric(&crate::metrics::MetricKey::cohort(cohort.clone()))
                .await?;
            Ok(Json(CohortResponse { cohort, data }).into_response())
        }
        None => {
            let cohorts = state.store.scan_metrics(Dimension::Cohort).await?;
            Ok(Json(CohortsResponse { cohorts }).into_response())
        }
    }
}

// =========================================================================
// GET /api/inventory
// =========================================================================

/// Inventory status grouped by category, optionally filtered
async fn get_inventory(
    State(state): State<AppState>,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<InventoryResponse>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|s| match s {
            "low" => Ok(StockStatus::Low),
            "normal" => Ok(StockStatus::Normal),
            other => Err(AppError::InvalidRequest(format!(
                "unknown inventory status: {other}"
            ))),
        })
        .transpose()?;

    let filter = InventoryFilter {
        status,
        category: query.category,
    };
    let records = state.store.scan_inventory(&filter).await?;

    let total_items = records.len();
    let mut categories: std::collections::BTreeMap<String, Vec<InventoryRecord>> =
        std::collections::BTreeMap::new();
    for record in records {
        categories
            .entry(record.category.clone())
            .or_default()
            .push(record);
    }

    Ok(Json(InventoryResponse {
        categories,
        total_items,
    }))
}

// =========================================================================
// GET /api/notifications
// =========================================================================

/// Recent notifications, newest first
async fn get_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<NotificationsResponse>, AppError> {
    let kind = query
        .kind
        .as_deref()
        .map(|k| match k {
            "inventory_alert" => Ok(NotificationKind::InventoryAlert),
            "order_confirmation" => Ok(NotificationKind::OrderConfirmation),
            "customer_loyalty" => Ok(NotificationKind::CustomerLoyalty),
            other => Err(AppError::InvalidRequest(format!(
                "unknown notification type: {other}"
            ))),
        })
        .transpose()?;

    let notifications = state.store.list_notifications(kind, query.limit).await?;
    let count = notifications.len();

    Ok(Json(NotificationsResponse {
        notifications,
        count,
    }))
}

// =========================================================================
// GET /api
// =========================================================================

/// Summary data for the dashboard homepage
async fn dashboard_summary(
    State(state): State<AppState>,
) -> Result<Json<DashboardSummary>, AppError> {
    let recent_sales = sales_window(&state, "day", "last7", Utc::now()).await?;
    let customer_cohorts = state.store.scan_metrics(Dimension::Cohort).await?;
    let low_inventory = state
        .store
        .scan_inventory(&InventoryFilter {
            status: Some(StockStatus::Low),
            category: None,
        })
        .await?;
    let recent_notifications = state.store.list_notifications(None, 5).await?;

    Ok(Json(DashboardSummary {
        recent_sales,
        customer_cohorts,
        low_inventory_items: low_inventory.len(),
        recent_notifications,
    }))
}

// =========================================================================
// GET /api/reports
// =========================================================================

/// Available report types and formats
async fn report_options() -> Json<ReportOptions> {
    Json(ReportOptions {
        report_types: ReportType::all().to_vec(),
        formats: ReportFormat::all().to_vec(),
    })
}

// =========================================================================
// POST /api/reports
// =========================================================================

/// Generate a report snapshot and answer with its download receipt
async fn generate_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<ReportReceipt>, AppError> {
    let receipt = state.reports.generate(&request).await?;
    Ok(Json(receipt))
}
