//! Catalog change events
//!
//! [`EventBus`] is an in-process broadcast channel of entity mutations.
//! [`ChangeListener`] subscribes to it and turns every event into a
//! [`SyncJobData`] on the queue of the entity's kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::models::{EntityType, OperationType, SyncJobData};
use crate::queue::SyncQueues;

/// One create, update or delete of a catalog entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEvent {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation_type: OperationType,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl CatalogEvent {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        operation_type: OperationType,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            operation_type,
            occurred_at: Utc::now(),
        }
    }
}

/// Broadcast bus of catalog events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; returns the number of subscribers reached
    pub fn publish(&self, event: CatalogEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!(
                    entity_type = %event.entity_type,
                    entity_id = %event.entity_id,
                    "No subscribers for catalog event"
                );
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Translates catalog events into queued sync jobs
pub struct ChangeListener {
    queues: Arc<SyncQueues>,
}

impl ChangeListener {
    pub fn new(queues: Arc<SyncQueues>) -> Self {
        Self { queues }
    }

    /// Enqueue the sync job for one event
    pub async fn handle(&self, event: &CatalogEvent) -> Result<SyncJobData, QueueError> {
        let job = SyncJobData::new(
            event.entity_type,
            event.entity_id.clone(),
            event.operation_type,
        );
        self.queues.enqueue(job.clone()).await?;
        Ok(job)
    }

    /// Consume events until shutdown or until the bus is dropped
    pub async fn run(
        self,
        mut events: broadcast::Receiver<CatalogEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Change listener started");

        loop {
            let event = tokio::select! {
                _ = shutdown_rx.recv() => break,
                received = events.recv() => received,
            };

            match event {
                Ok(event) => {
                    if let Err(e) = self.handle(&event).await {
                        warn!(
                            entity_type = %event.entity_type,
                            entity_id = %event.entity_id,
                            operation = %event.operation_type,
                            error = %e,
                            "Dropping catalog event"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change listener lagged, events were skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }

        info!("Change listener stopped");
    }
}
