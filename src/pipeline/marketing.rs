//! Marketing profile export step
//!
//! Derives the marketing view of an analyzed customer (segment, product
//! recommendations, campaign eligibility) and ships it to the object store
//! for the downstream marketing integration to pick up.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::classify::{self, CustomerSegment};
use crate::domain::{CustomerAnalyzedDetail, CustomerType, DomainError};
use crate::report::ObjectStore;

use super::PipelineError;

const EXPORT_PREFIX: &str = "source-data";

/// Marketing view of one customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketingProfile {
    pub customer_id: String,
    pub customer_type: CustomerType,
    pub segment: CustomerSegment,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total_spent: Decimal,
    pub total_purchases: i64,
    pub purchase_categories: Vec<String>,
    pub recommended_products: Vec<String>,
    pub eligible_campaigns: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

pub struct MarketingExporter {
    objects: Arc<dyn ObjectStore>,
}

impl MarketingExporter {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    pub async fn process(
        &self,
        detail: &CustomerAnalyzedDetail,
    ) -> Result<MarketingProfile, PipelineError> {
        let segment = classify::customer_segment(detail.total_spent, detail.customer_type);
        let recommended_products = classify::recommended_products(&detail.purchase_categories)
            .into_iter()
            .map(String::from)
            .collect();
        let eligible_campaigns =
            classify::eligible_campaigns(segment, detail.total_purchases, &detail.purchase_categories)
                .into_iter()
                .map(String::from)
                .collect();

        let profile = MarketingProfile {
            customer_id: detail.customer_id.clone(),
            customer_type: detail.customer_type,
            segment,
            total_spent: detail.total_spent,
            total_purchases: detail.total_purchases,
            purchase_categories: detail.purchase_categories.clone(),
            recommended_products,
            eligible_campaigns,
            last_updated: Utc::now(),
        };

        let key = format!(
            "{}/customer_{}_{}.json",
            EXPORT_PREFIX,
            profile.customer_id,
            profile.last_updated.format("%Y%m%d%H%M%S")
        );
        let body = serde_json::to_vec(&profile).map_err(DomainError::from)?;
        self.objects.put(&key, body, "application/json").await?;

        tracing::info!(
            customer_id = %profile.customer_id,
            segment = %profile.segment,
            key = %key,
            "Marketing profile exported"
        );

        Ok(profile)
    }
}
