//! Classifiers
//!
//! Pure, deterministic mappings from cumulative numeric state to labels.
//! These run on every aggregate update, since a label can change as the
//! cumulative state grows (a customer crossing into VIP, stock dropping
//! into low). No side effects; safe to call any number of times.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::CustomerType;

/// Spend threshold above which a customer is a VIP (strictly greater).
const VIP_SPEND_THRESHOLD: i64 = 500;

/// Spend threshold above which a customer is Frequent (strictly greater).
const FREQUENT_SPEND_THRESHOLD: i64 = 200;

/// Stock level below which a product is low (strictly less).
pub const LOW_STOCK_THRESHOLD: i64 = 20;

/// Stock assumed for a product never seen before.
pub const DEFAULT_INITIAL_STOCK: i64 = 100;

/// Purchase count above which a customer earns loyalty rewards (strictly greater).
const LOYALTY_PURCHASE_THRESHOLD: i64 = 5;

/// Customer marketing segment, derived from cumulative spend and type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerSegment {
    #[serde(rename = "VIP")]
    Vip,
    Frequent,
    Loyal,
    New,
}

impl CustomerSegment {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerSegment::Vip => "VIP",
            CustomerSegment::Frequent => "Frequent",
            CustomerSegment::Loyal => "Loyal",
            CustomerSegment::New => "New",
        }
    }
}

impl fmt::Display for CustomerSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the customer segment. Rules are evaluated in order; first match
/// wins. Both spend boundaries are strict: exactly 500 is not VIP, exactly
/// 200 is not Frequent.
pub fn customer_segment(total_spent: Decimal, customer_type: CustomerType) -> CustomerSegment {
    if total_spent > Decimal::from(VIP_SPEND_THRESHOLD) {
        CustomerSegment::Vip
    } else if total_spent > Decimal::from(FREQUENT_SPEND_THRESHOLD) {
        CustomerSegment::Frequent
    } else if customer_type == CustomerType::Repeat {
        CustomerSegment::Loyal
    } else {
        CustomerSegment::New
    }
}

/// Inventory stock status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Low,
    Normal,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Low => "low",
            StockStatus::Normal => "normal",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the stock status: strictly below 20 is low.
pub fn stock_status(stock_level: i64) -> StockStatus {
    if stock_level < LOW_STOCK_THRESHOLD {
        StockStatus::Low
    } else {
        StockStatus::Normal
    }
}

/// Fulfillment center a shipped order is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentCenter {
    East,
    West,
    Central,
}

impl FulfillmentCenter {
    /// The center's routing code as carried on events.
    pub fn code(&self) -> &'static str {
        match self {
            FulfillmentCenter::East => "fc_east_001",
            FulfillmentCenter::West => "fc_west_001",
            FulfillmentCenter::Central => "fc_central_001",
        }
    }
}

const EAST_COAST_STATES: &[&str] = &[
    "NY", "NJ", "PA", "MA", "CT", "RI", "NH", "ME", "VT", "DE", "MD", "VA", "NC", "SC", "GA", "FL",
];

const WEST_COAST_STATES: &[&str] = &["CA", "OR", "WA", "NV", "AZ"];

/// Assign a fulfillment center from the shipping state code.
/// Unmatched codes default to central.
pub fn fulfillment_center(state: &str) -> FulfillmentCenter {
    if EAST_COAST_STATES.contains(&state) {
        FulfillmentCenter::East
    } else if WEST_COAST_STATES.contains(&state) {
        FulfillmentCenter::West
    } else {
        FulfillmentCenter::Central
    }
}

/// Marketing campaigns a customer is eligible for. The result is the union
/// of every matching rule; order of the returned list follows rule order
/// but carries no meaning.
pub fn eligible_campaigns(
    segment: CustomerSegment,
    total_purchases: i64,
    categories: &[String],
) -> Vec<&'static str> {
    let mut campaigns = Vec::new();

    if segment == CustomerSegment::Vip {
        campaigns.push("premium_member_discount");
    }
    if total_purchases > LOYALTY_PURCHASE_THRESHOLD {
        campaigns.push("loyalty_rewards");
    }
    if categories.iter().any(|c| c == "electronics") {
        campaigns.push("tech_upgrade");
    }
    if segment == CustomerSegment::New {
        campaigns.push("welcome_discount");
    }

    campaigns
}

/// Product recommendations from purchase category history.
pub fn recommended_products(categories: &[String]) -> Vec<&'static str> {
    let mut products = Vec::new();

    if categories.iter().any(|c| c == "clothing") {
        products.extend(["p1001", "p1002", "p1007"]);
    }
    if categories.iter().any(|c| c == "footwear") {
        products.push("p1003");
    }
    if categories.iter().any(|c| c == "accessories") {
        products.extend(["p1004", "p1005", "p1006"]);
    }
    if categories.iter().any(|c| c == "electronics") {
        products.push("p1008");
    }

    products
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_segment_vip_over_500() {
        assert_eq!(
            customer_segment(dec!(501), CustomerType::New),
            CustomerSegment::Vip
        );
        // VIP wins regardless of customer type
        assert_eq!(
            customer_segment(dec!(501), CustomerType::Repeat),
            CustomerSegment::Vip
        );
    }

    #[test]
    fn test_segment_boundaries_are_strict() {
        // Exactly 500 is not VIP; repeat makes it Frequent
        assert_eq!(
            customer_segment(dec!(500), CustomerType::Repeat),
            CustomerSegment::Frequent
        );
        // Exactly 200.00 is not Frequent
        assert_eq!(
            customer_segment(dec!(200.00), CustomerType::New),
            CustomerSegment::New
        );
        assert_eq!(
            customer_segment(dec!(200.00), CustomerType::Repeat),
            CustomerSegment::Loyal
        );
        assert_eq!(
            customer_segment(dec!(200.01), CustomerType::New),
            CustomerSegment::Frequent
        );
    }

    #[test]
    fn test_segment_loyal_and_new() {
        assert_eq!(
            customer_segment(dec!(50), CustomerType::Repeat),
            CustomerSegment::Loyal
        );
        assert_eq!(
            customer_segment(dec!(50), CustomerType::New),
            CustomerSegment::New
        );
    }

    #[test]
    fn test_stock_status_boundary() {
        assert_eq!(stock_status(19), StockStatus::Low);
        assert_eq!(stock_status(20), StockStatus::Normal);
        assert_eq!(stock_status(0), StockStatus::Low);
        assert_eq!(stock_status(100), StockStatus::Normal);
    }

    #[test]
    fn test_fulfillment_center_assignment() {
        assert_eq!(fulfillment_center("NY"), FulfillmentCenter::East);
        assert_eq!(fulfillment_center("FL"), FulfillmentCenter::East);
        assert_eq!(fulfillment_center("CA"), FulfillmentCenter::West);
        assert_eq!(fulfillment_center("TX"), FulfillmentCenter::Central);
        // Unknown codes fall back to central
        assert_eq!(fulfillment_center("ZZ"), FulfillmentCenter::Central);
        assert_eq!(fulfillment_center("fc_east_001"), FulfillmentCenter::Central);
    }

    #[test]
    fn test_fulfillment_center_codes() {
        assert_eq!(FulfillmentCenter::East.code(), "fc_east_001");
        assert_eq!(FulfillmentCenter::West.code(), "fc_west_001");
        assert_eq!(FulfillmentCenter::Central.code(), "fc_central_001");
    }

    #[test]
    fn test_eligible_campaigns_union() {
        let categories = vec!["electronics".to_string(), "clothing".to_string()];
        let campaigns = eligible_campaigns(CustomerSegment::Vip, 6, &categories);
        assert_eq!(
            campaigns,
            vec!["premium_member_discount", "loyalty_rewards", "tech_upgrade"]
        );
    }

    #[test]
    fn test_eligible_campaigns_new_customer() {
        let campaigns = eligible_campaigns(CustomerSegment::New, 1, &[]);
        assert_eq!(campaigns, vec!["welcome_discount"]);
    }

    #[test]
    fn test_eligible_campaigns_purchase_boundary() {
        // Exactly 5 purchases does not qualify
        let campaigns = eligible_campaigns(CustomerSegment::Loyal, 5, &[]);
        assert!(campaigns.is_empty());

        let campaigns = eligible_campaigns(CustomerSegment::Loyal, 6, &[]);
        assert_eq!(campaigns, vec!["loyalty_rewards"]);
    }

    #[test]
    fn test_recommended_products() {
        let categories = vec!["footwear".to_string(), "electronics".to_string()];
        assert_eq!(recommended_products(&categories), vec!["p1003", "p1008"]);

        let categories = vec!["clothing".to_string()];
        assert_eq!(
            recommended_products(&categories),
            vec!["p1001", "p1002", "p1007"]
        );
    }
}
