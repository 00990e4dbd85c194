//! In-memory event bus, useful for testing and single-process deployment.
//!
//! Published events are appended to a log; when a consumer channel is
//! attached, they are also forwarded to it so a pipeline worker can drain
//! them.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::domain::{EventEnvelope, EventKind};

use super::{EventBus, PublishError};

/// Thread-safe in-memory implementation of [`EventBus`].
#[derive(Default)]
pub struct InMemoryEventBus {
    log: Mutex<Vec<EventEnvelope>>,
    consumer: Mutex<Option<UnboundedSender<EventEnvelope>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a consumer channel; subsequently published events are
    /// forwarded to it in publish order.
    pub fn attach_consumer(&self) -> UnboundedReceiver<EventEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock_ignoring_poison(&self.consumer) = Some(tx);
        rx
    }

    /// Snapshot of everything published so far.
    pub fn published(&self) -> Vec<EventEnvelope> {
        lock_ignoring_poison(&self.log).clone()
    }

    /// Published events of one kind.
    pub fn published_of_kind(&self, kind: EventKind) -> Vec<EventEnvelope> {
        lock_ignoring_poison(&self.log)
            .iter()
            .filter(|e| e.kind() == Some(kind))
            .cloned()
            .collect()
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), PublishError> {
        lock_ignoring_poison(&self.log).push(event.clone());

        let mut consumer = lock_ignoring_poison(&self.consumer);
        if let Some(tx) = consumer.as_ref() {
            if tx.send(event).is_err() {
                // Consumer went away; keep logging but stop forwarding
                *consumer = None;
            }
        }

        Ok(())
    }
}
