//! Event Bus
//!
//! Seam to the event transport. Delivery is at-least-once with no ordering
//! guarantee across keys; publish is best-effort per event, and a failed
//! publish surfaces as that event's failure so its delivery can be retried
//! by the transport.

pub mod memory;

use async_trait::async_trait;

use crate::domain::EventEnvelope;

pub use memory::InMemoryEventBus;

/// Errors publishing an event.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The transport rejected or dropped the publish
    #[error("Event transport rejected publish: {0}")]
    Transport(String),

    /// The payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Publish side of the event transport.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: EventEnvelope) -> Result<(), PublishError>;
}
