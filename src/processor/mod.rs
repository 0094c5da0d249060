//! Sync job processing
//!
//! [`SyncProcessor`] loads the entity a job names from the catalog when the
//! job runs and sends the resulting request to every configured adapter.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::adapters::{dispatch, CmsAdapter, SyncRequest};
use crate::catalog::CatalogSource;
use crate::error::SyncError;
use crate::models::{EntityType, OperationType, SyncJobData, SyncOutcome};
use crate::otel::SyncMetrics;
use crate::queue::JobProcessor;

/// Outcome of one adapter for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterOutcome {
    pub adapter: String,
    pub outcome: SyncOutcome,
}

pub struct SyncProcessor {
    catalog: Arc<dyn CatalogSource>,
    adapters: Vec<Arc<dyn CmsAdapter>>,
    metrics: Arc<SyncMetrics>,
}

impl SyncProcessor {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        adapters: Vec<Arc<dyn CmsAdapter>>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            catalog,
            adapters,
            metrics,
        }
    }

    pub fn adapters(&self) -> &[Arc<dyn CmsAdapter>] {
        &self.adapters
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogSource> {
        &self.catalog
    }

    /// Request for the current state of an entity
    ///
    /// `None` when a create or update names an entity the catalog no longer
    /// has. Deletes never need the snapshot.
    async fn build_request(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation_type: OperationType,
    ) -> Result<Option<SyncRequest>, SyncError> {
        if operation_type == OperationType::Delete {
            return Ok(Some(SyncRequest::delete(entity_type, entity_id)));
        }

        let entity = self.catalog.get_entity(entity_type, entity_id).await?;
        Ok(entity.map(|entity| SyncRequest::upsert(operation_type, entity)))
    }

    /// Sync one entity to every adapter
    ///
    /// Adapters run concurrently. Every adapter is attempted; the first
    /// error in adapter order is returned once all have finished.
    pub async fn sync_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation_type: OperationType,
    ) -> Result<Vec<AdapterOutcome>, SyncError> {
        if self.adapters.is_empty() {
            warn!(%entity_type, entity_id, "No CMS adapters configured");
            return Ok(Vec::new());
        }

        let Some(request) = self
            .build_request(entity_type, entity_id, operation_type)
            .await?
        else {
            info!(
                %entity_type,
                entity_id,
                operation = %operation_type,
                "Entity not in catalog, skipping"
            );
            let reason = format!("{} {} not found in catalog", entity_type, entity_id);
            return Ok(self
                .adapters
                .iter()
                .map(|adapter| AdapterOutcome {
                    adapter: adapter.name().to_string(),
                    outcome: SyncOutcome::skipped(reason.clone()),
                })
                .collect());
        };

        let calls = self.adapters.iter().map(|adapter| {
            let request = &request;
            async move {
                let started = Instant::now();
                let result = dispatch(adapter.as_ref(), request).await;
                let label = match &result {
                    Ok(SyncOutcome::Created { .. }) => "created",
                    Ok(SyncOutcome::Updated { .. }) => "updated",
                    Ok(SyncOutcome::Deleted { .. }) => "deleted",
                    Ok(SyncOutcome::NotFound) => "not_found",
                    Ok(SyncOutcome::Skipped { .. }) => "skipped",
                    Err(_) => "error",
                };
                self.metrics.record_cms_request(
                    adapter.name(),
                    label,
                    started.elapsed().as_secs_f64(),
                );
                (adapter.name().to_string(), result)
            }
        });

        let mut outcomes = Vec::with_capacity(self.adapters.len());
        let mut first_error = None;
        for (adapter, result) in join_all(calls).await {
            match result {
                Ok(outcome) => {
                    debug!(adapter = %adapter, %entity_type, entity_id, ?outcome, "Adapter finished");
                    outcomes.push(AdapterOutcome { adapter, outcome });
                }
                Err(err) => {
                    warn!(adapter = %adapter, %entity_type, entity_id, error = %err, "Adapter failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }
}

#[async_trait]
impl JobProcessor for SyncProcessor {
    async fn process(&self, job: &SyncJobData) -> Result<(), SyncError> {
        self.sync_entity(job.entity_type, &job.entity_id, job.operation_type)
            .await
            .map(|_| ())
    }
}
