//! Report rendering
//!
//! Serializes built reports to their export formats. CSV column sets are
//! fixed per report type.

use serde::Serialize;

use super::{CustomerReport, InventoryReport, ReportError, SalesReport};

/// Render any report as pretty JSON.
pub fn to_json<T: Serialize>(report: &T) -> Result<Vec<u8>, ReportError> {
    Ok(serde_json::to_vec_pretty(report)?)
}

/// Sales report CSV: one row per time bucket.
pub fn sales_csv(report: &SalesReport) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Date", "Total Sales", "Transactions", "Items", "Categories"])?;

    for record in &report.details {
        let categories: Vec<&str> = record.tags.iter().map(String::as_str).collect();
        writer.write_record([
            record.key.bucket.as_str(),
            &record.total_amount.value().to_string(),
            &record.transaction_count.to_string(),
            &record.item_count.to_string(),
            &categories.join(", "),
        ])?;
    }

    finish(writer)
}

/// Customer report CSV: one row per cohort.
pub fn customers_csv(report: &CustomerReport) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Cohort",
        "Customers",
        "Revenue",
        "New Customers",
        "Repeat Customers",
    ])?;

    for cohort in &report.cohorts {
        writer.write_record([
            cohort.key.bucket.as_str(),
            &cohort.customer_count.to_string(),
            &cohort.total_amount.value().to_string(),
            &cohort.new_customers.to_string(),
            &cohort.repeat_customers.to_string(),
        ])?;
    }

    finish(writer)
}

/// Inventory report CSV: one row per product, grouped by category.
pub fn inventory_csv(report: &InventoryReport) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Product ID",
        "Product Name",
        "Category",
        "Stock Level",
        "Status",
    ])?;

    for items in report.categories.values() {
        for item in items {
            writer.write_record([
                item.product_id.as_str(),
                item.product_name.as_str(),
                item.category.as_str(),
                &item.stock_level.to_string(),
                item.status.as_str(),
            ])?;
        }
    }

    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ReportError> {
    writer
        .into_inner()
        .map_err(|e| ReportError::Render(e.to_string()))
}
