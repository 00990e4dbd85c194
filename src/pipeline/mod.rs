//! Event pipeline
//!
//! The router dispatches inbound events to their processing steps over an
//! explicit `EventKind` table and processes batches with per-event
//! isolation: a malformed event is skipped, a publish failure fails only
//! its event, and only loss of the store aborts the remainder of a batch.
//! Merges commit before any dependent publish, so a failed publish never
//! rolls back aggregate state; the transport retries the event and the
//! store's per-event deduplication absorbs the re-merge.

mod customer;
mod insights;
mod inventory;
mod marketing;
mod order;

pub use customer::CustomerAnalytics;
pub use insights::InsightsAggregator;
pub use inventory::InventoryTracker;
pub use marketing::{MarketingExporter, MarketingProfile};
pub use order::OrderProcessor;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::bus::{EventBus, PublishError};
use crate::domain::{DomainError, EventEnvelope, EventKind};
use crate::metrics::{Store, StoreError};
use crate::notify::NotificationService;
use crate::report::{ObjectStore, ObjectStoreError};

/// Default per-event processing deadline.
const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors processing one event.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Object(#[from] ObjectStoreError),

    #[error("Event processing timed out after {0:?}")]
    Timeout(Duration),
}

impl PipelineError {
    /// Skippable failures will never succeed on redelivery; log and move on.
    pub fn is_skippable(&self) -> bool {
        matches!(self, PipelineError::Domain(e) if e.is_skippable())
    }

    /// Fatal failures (store connectivity) abort the rest of the batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Store(e) if e.is_fatal())
    }
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Dispatched to at least one processing step
    Handled,
    /// Unknown `(source, detail_type)` pair; not an error
    Ignored,
}

/// One failed event in a batch.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub index: usize,
    pub event_id: Uuid,
    pub error: String,
}

/// Per-event outcomes of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub handled: usize,
    pub ignored: usize,
    pub skipped: usize,
    pub failures: Vec<BatchFailure>,
    /// Events never attempted because a fatal failure aborted the batch
    pub not_attempted: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.handled + self.ignored + self.skipped + self.failures.len() + self.not_attempted
    }

    /// Convert to an invocation result: any failed event fails the batch so
    /// the transport redelivers it.
    pub fn into_result(self) -> Result<BatchReport, BatchFailed> {
        if self.failures.is_empty() && self.not_attempted == 0 {
            Ok(self)
        } else {
            Err(BatchFailed { report: self })
        }
    }
}

/// A batch with at least one failed or unattempted event.
#[derive(Debug, thiserror::Error)]
#[error("{failed} of {total} events failed", failed = .report.failures.len() + .report.not_attempted, total = .report.total())]
pub struct BatchFailed {
    pub report: BatchReport,
}

/// Dispatches events to their processing steps.
pub struct Router {
    order: OrderProcessor,
    customers: CustomerAnalytics,
    inventory: InventoryTracker,
    insights: InsightsAggregator,
    marketing: MarketingExporter,
    notifications: NotificationService,
    event_timeout: Duration,
}

impl Router {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<dyn EventBus>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            order: OrderProcessor::new(bus.clone()),
            customers: CustomerAnalytics::new(store.clone(), bus.clone()),
            inventory: InventoryTracker::new(store.clone(), bus.clone()),
            insights: InsightsAggregator::new(store.clone()),
            marketing: MarketingExporter::new(objects),
            notifications: NotificationService::new(store),
            event_timeout: DEFAULT_EVENT_TIMEOUT,
        }
    }

    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = timeout;
        self
    }

    /// Process a batch of events independently. One event's failure never
    /// rolls back or blocks its siblings; only a fatal store failure stops
    /// the batch early.
    pub async fn process_batch(&self, events: &[EventEnvelope]) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, event) in events.iter().enumerate() {
            let outcome = tokio::time::timeout(self.event_timeout, self.dispatch(event)).await;

            match outcome {
                Err(_) => {
                    let error = PipelineError::Timeout(self.event_timeout);
                    tracing::error!(event_id = %event.event_id, %error, "Event timed out");
                    report.failures.push(BatchFailure {
                        index,
                        event_id: event.event_id,
                        error: error.to_string(),
                    });
                }
                Ok(Ok(Disposition::Handled)) => report.handled += 1,
                Ok(Ok(Disposition::Ignored)) => {
                    tracing::debug!(
                        source = %event.source,
                        detail_type = %event.detail_type,
                        "Ignoring unroutable event"
                    );
                    report.ignored += 1;
                }
                Ok(Err(error)) if error.is_skippable() => {
                    tracing::warn!(event_id = %event.event_id, %error, "Skipping event");
                    report.skipped += 1;
                }
                Ok(Err(error)) if error.is_fatal() => {
                    tracing::error!(event_id = %event.event_id, %error, "Aborting batch");
                    report.failures.push(BatchFailure {
                        index,
                        event_id: event.event_id,
                        error: error.to_string(),
                    });
                    report.not_attempted = events.len() - index - 1;
                    break;
                }
                Ok(Err(error)) => {
                    tracing::error!(event_id = %event.event_id, %error, "Event failed");
                    report.failures.push(BatchFailure {
                        index,
                        event_id: event.event_id,
                        error: error.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Route one event through its processing steps.
    pub async fn dispatch(&self, event: &EventEnvelope) -> Result<Disposition, PipelineError> {
        let Some(kind) = event.kind() else {
            return Ok(Disposition::Ignored);
        };

        match kind {
            EventKind::Purchase => {
                let detail = event.parse_detail()?;
                self.order.process(event.event_id, &detail).await?;
                self.customers.process(event.event_id, &detail).await?;
                self.inventory.process(event.event_id, &detail).await?;
            }
            EventKind::OrderProcessed => {
                let detail = event.parse_detail()?;
                self.insights.merge_sales(event.event_id, &detail).await?;
                self.notifications.order_confirmation(&detail).await?;
            }
            EventKind::CustomerAnalyzed => {
                let detail = event.parse_detail()?;
                self.insights.merge_cohort(event.event_id, &detail).await?;
                self.marketing.process(&detail).await?;
                self.notifications.customer_loyalty(&detail).await?;
            }
            EventKind::InventoryUpdated => {
                let detail = event.parse_detail()?;
                self.insights.inventory_summary(&detail);
            }
            EventKind::InventoryAlert => {
                let detail = event.parse_detail()?;
                self.notifications.inventory_alert(&detail).await?;
            }
        }

        Ok(Disposition::Handled)
    }
}
