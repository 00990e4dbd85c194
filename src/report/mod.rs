//! Report generation
//!
//! Builds sales, customer, and inventory reports from the aggregate store,
//! renders them as JSON or CSV, ships the snapshot to the object store, and
//! answers with a time-limited download reference.

pub mod object_store;
pub mod render;

pub use object_store::{InMemoryObjectStore, ObjectStore, ObjectStoreError};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::metrics::{AggregateRecord, Dimension, InventoryFilter, InventoryRecord, Store, StoreError};

/// How long report download references stay valid.
const REPORT_URL_TTL: Duration = Duration::from_secs(3600);

/// Errors generating a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Object(#[from] ObjectStoreError),

    #[error("CSV rendering failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Report rendering failed: {0}")]
    Render(String),
}

/// Report subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Sales,
    Customers,
    Inventory,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Sales => "sales",
            ReportType::Customers => "customers",
            ReportType::Inventory => "inventory",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ReportType::Sales => "Sales_Report",
            ReportType::Customers => "Customer_Report",
            ReportType::Inventory => "Inventory_Report",
        }
    }

    pub fn all() -> [&'static str; 3] {
        ["sales", "customers", "inventory"]
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Json => "application/json",
            ReportFormat::Csv => "text/csv",
        }
    }

    pub fn all() -> [&'static str; 2] {
        ["json", "csv"]
    }
}

/// Reporting window. `last7`/`last30` cover daily buckets, `last12` covers
/// twelve months of monthly buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportPeriod {
    #[serde(rename = "last7")]
    Last7,
    #[default]
    #[serde(rename = "last30")]
    Last30,
    #[serde(rename = "last12")]
    Last12,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Last7 => "last7",
            ReportPeriod::Last30 => "last30",
            ReportPeriod::Last12 => "last12",
        }
    }

    /// Sales dimension this window reads.
    fn dimension(&self) -> Dimension {
        match self {
            ReportPeriod::Last7 | ReportPeriod::Last30 => Dimension::Date,
            ReportPeriod::Last12 => Dimension::Month,
        }
    }

    /// Inclusive lower bound on bucket labels for this window.
    ///
    /// Bucket labels are zero-padded ISO forms, so a plain string
    /// comparison orders them chronologically.
    fn cutoff(&self, now: DateTime<Utc>) -> String {
        match self {
            ReportPeriod::Last7 => (now - chrono::Duration::days(7)).format("%Y-%m-%d"),
            ReportPeriod::Last30 => (now - chrono::Duration::days(30)).format("%Y-%m-%d"),
            ReportPeriod::Last12 => (now - chrono::Duration::days(365)).format("%Y-%m"),
        }
        .to_string()
    }
}

/// Report generation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub report_type: ReportType,
    #[serde(default)]
    pub format: ReportFormat,
    #[serde(default)]
    pub period: ReportPeriod,
}

/// Receipt for a generated report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportReceipt {
    pub report_type: ReportType,
    pub format: ReportFormat,
    pub period: ReportPeriod,
    pub generated_at: DateTime<Utc>,
    pub report_url: String,
    pub expires_in: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub total_sales: Decimal,
    pub total_transactions: i64,
    pub total_items: i64,
    pub avg_transaction_value: Decimal,
    pub avg_items_per_transaction: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub report_type: ReportType,
    pub period: ReportPeriod,
    pub generated_at: DateTime<Utc>,
    pub summary: SalesSummary,
    pub details: Vec<AggregateRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub total_customers: i64,
    pub total_revenue: Decimal,
    pub new_customers: i64,
    pub repeat_customers: i64,
    pub avg_revenue_per_customer: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerReport {
    pub report_type: ReportType,
    pub generated_at: DateTime<Utc>,
    pub summary: CustomerSummary,
    pub cohorts: Vec<AggregateRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub total_products: usize,
    pub low_stock_products: usize,
    pub normal_stock_products: usize,
    pub category_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReport {
    pub report_type: ReportType,
    pub generated_at: DateTime<Utc>,
    pub summary: InventorySummary,
    pub categories: BTreeMap<String, Vec<InventoryRecord>>,
}

/// Builds and exports reports.
#[derive(Clone)]
pub struct ReportGenerator {
    store: Arc<dyn Store>,
    objects: Arc<dyn ObjectStore>,
}

impl ReportGenerator {
    pub fn new(store: Arc<dyn Store>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }

    /// Build the requested report, render it, store the snapshot, and
    /// return the download receipt.
    pub async fn generate(&self, request: &ReportRequest) -> Result<ReportReceipt, ReportError> {
        let generated_at = Utc::now();

        let body = match (request.report_type, request.format) {
            (ReportType::Sales, ReportFormat::Json) => {
                render::to_json(&self.sales_report(request.period, generated_at).await?)?
            }
            (ReportType::Sales, ReportFormat::Csv) => {
                render::sales_csv(&self.sales_report(request.period, generated_at).await?)?
            }
            (ReportType::Customers, ReportFormat::Json) => {
                render::to_json(&self.customer_report(generated_at).await?)?
            }
            (ReportType::Customers, ReportFormat::Csv) => {
                render::customers_csv(&self.customer_report(generated_at).await?)?
            }
            (ReportType::Inventory, ReportFormat::Json) => {
                render::to_json(&self.inventory_report(generated_at).await?)?
            }
            (ReportType::Inventory, ReportFormat::Csv) => {
                render::inventory_csv(&self.inventory_report(generated_at).await?)?
            }
        };

        let key = format!(
            "reports/{}/{}_{}.{}",
            request.format.as_str(),
            request.report_type.title(),
            generated_at.format("%Y%m%d%H%M%S"),
            request.format.as_str(),
        );

        self.objects
            .put(&key, body, request.format.content_type())
            .await?;
        let report_url = self.objects.presign(&key, REPORT_URL_TTL).await?;

        tracing::info!(
            report_type = %request.report_type,
            format = request.format.as_str(),
            key = %key,
            "Report generated"
        );

        Ok(ReportReceipt {
            report_type: request.report_type,
            format: request.format,
            period: request.period,
            generated_at,
            report_url,
            expires_in: "1 hour".to_string(),
        })
    }

    /// Sales rollup over the report window, with summary statistics.
    pub async fn sales_report(
        &self,
        period: ReportPeriod,
        generated_at: DateTime<Utc>,
    ) -> Result<SalesReport, ReportError> {
        let cutoff = period.cutoff(generated_at);
        let details: Vec<AggregateRecord> = self
            .store
            .scan_metrics(period.dimension())
            .await?
            .into_iter()
            .filter(|r| r.key.bucket >= cutoff)
            .collect();

        let total_sales: Decimal = details.iter().map(|r| r.total_amount.value()).sum();
        let total_transactions: i64 = details.iter().map(|r| r.transaction_count).sum();
        let total_items: i64 = details.iter().map(|r| r.item_count).sum();

        let (avg_transaction_value, avg_items_per_transaction) = if total_transactions > 0 {
            (
                (total_sales / Decimal::from(total_transactions)).round_dp(2),
                (Decimal::from(total_items) / Decimal::from(total_transactions)).round_dp(2),
            )
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

        Ok(SalesReport {
            report_type: ReportType::Sales,
            period,
            generated_at,
            summary: SalesSummary {
                total_sales,
                total_transactions,
                total_items,
                avg_transaction_value,
                avg_items_per_transaction,
            },
            details,
        })
    }

    /// All cohort insights with overall statistics.
    pub async fn customer_report(
        &self,
        generated_at: DateTime<Utc>,
    ) -> Result<CustomerReport, ReportError> {
        let cohorts = self.store.scan_metrics(Dimension::Cohort).await?;

        let total_customers: i64 = cohorts.iter().map(|c| c.customer_count).sum();
        let total_revenue: Decimal = cohorts.iter().map(|c| c.total_amount.value()).sum();
        let new_customers: i64 = cohorts.iter().map(|c| c.new_customers).sum();
        let repeat_customers: i64 = cohorts.iter().map(|c| c.repeat_customers).sum();

        let avg_revenue_per_customer = if total_customers > 0 {
            (total_revenue / Decimal::from(total_customers)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        Ok(CustomerReport {
            report_type: ReportType::Customers,
            generated_at,
            summary: CustomerSummary {
                total_customers,
                total_revenue,
                new_customers,
                repeat_customers,
                avg_revenue_per_customer,
            },
            cohorts,
        })
    }

    /// All inventory records grouped by category, with status counts.
    pub async fn inventory_report(
        &self,
        generated_at: DateTime<Utc>,
    ) -> Result<InventoryReport, ReportError> {
        let records = self
            .store
            .scan_inventory(&InventoryFilter::default())
            .await?;

        let total_products = records.len();
        let low_stock_products = records
            .iter()
            .filter(|r| r.status == crate::classify::StockStatus::Low)
            .count();
        let normal_stock_products = total_products - low_stock_products;

        let mut categories: BTreeMap<String, Vec<InventoryRecord>> = BTreeMap::new();
        for record in records {
            categories
                .entry(record.category.clone())
                .or_default()
                .push(record);
        }

        Ok(InventoryReport {
            report_type: ReportType::Inventory,
            generated_at,
            summary: InventorySummary {
                total_products,
                low_stock_products,
                normal_stock_products,
                category_count: categories.len(),
            },
            categories,
        })
    }
}
