//! Bulk reconciliation
//!
//! Re-syncs every entity of one kind. Each id becomes a [`WorkItem`] that
//! moves through [`JobState`]: a retryable failure goes back to the tail of
//! the work list with a capped exponential delay, anything else (or the last
//! allowed attempt) ends as a permanent failure in the summary.

use futures::future::join_all;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::CatalogSource;
use crate::config::ReconcilerConfig;
use crate::error::SyncError;
use crate::models::{EntityType, JobState, OperationType, SyncJobData};
use crate::queue::JobProcessor;
use crate::sync::RetryPolicy;

/// One entity's progress through a reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub entity_id: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub state: JobState,
    pub last_error: Option<String>,
    ready_at: Option<Instant>,
}

impl WorkItem {
    pub fn new(entity_id: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            entity_id: entity_id.into(),
            attempts: 0,
            max_attempts,
            state: JobState::Pending,
            last_error: None,
            ready_at: None,
        }
    }
}

/// Entity that exhausted its attempts or failed permanently
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEntity {
    pub entity_id: String,
    pub attempts: u32,
    pub last_error: String,
}

/// Result of reconciling one entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub entity_type: EntityType,
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub duration_ms: u64,
    pub failures: Vec<FailedEntity>,
}

pub struct BulkReconciler {
    catalog: Arc<dyn CatalogSource>,
    processor: Arc<dyn JobProcessor>,
    policy: RetryPolicy,
    concurrency: usize,
}

impl BulkReconciler {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        processor: Arc<dyn JobProcessor>,
        config: &ReconcilerConfig,
    ) -> Self {
        Self {
            catalog,
            processor,
            policy: RetryPolicy::new(config.max_attempts, config.backoff.clone()),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Sync every entity of `entity_type` and report the totals
    pub async fn reconcile(&self, entity_type: EntityType) -> Result<ReconcileSummary, SyncError> {
        let started = Instant::now();
        let ids = self.catalog.list_ids(entity_type).await?;
        let total = ids.len();

        info!(
            %entity_type,
            total,
            concurrency = self.concurrency,
            "Starting reconciliation"
        );

        let max_attempts = self.policy.max_attempts();
        let mut pending: VecDeque<WorkItem> = ids
            .into_iter()
            .map(|id| WorkItem::new(id, max_attempts))
            .collect();
        let mut success_count = 0;
        let mut failures = Vec::new();

        while !pending.is_empty() {
            let take = self.concurrency.min(pending.len());
            let group: Vec<WorkItem> = pending.drain(..take).collect();

            // Items coming back from a retry wait out their delay
            if let Some(ready_at) = group.iter().filter_map(|item| item.ready_at).max() {
                if ready_at > Instant::now() {
                    tokio::time::sleep_until(ready_at).await;
                }
            }

            let attempts = group
                .into_iter()
                .map(|item| self.attempt(entity_type, item));

            for mut item in join_all(attempts).await {
                match item.state {
                    JobState::Succeeded => success_count += 1,
                    JobState::FailedPermanent => {
                        warn!(
                            %entity_type,
                            entity_id = %item.entity_id,
                            attempts = item.attempts,
                            error = item.last_error.as_deref().unwrap_or_default(),
                            "Entity failed permanently"
                        );
                        failures.push(FailedEntity {
                            entity_id: item.entity_id,
                            attempts: item.attempts,
                            last_error: item.last_error.unwrap_or_default(),
                        });
                    }
                    JobState::FailedRetryable => {
                        item.state = JobState::Pending;
                        pending.push_back(item);
                    }
                    JobState::Pending | JobState::InFlight => pending.push_back(item),
                }
            }
        }

        let summary = ReconcileSummary {
            entity_type,
            total,
            success_count,
            error_count: failures.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            failures,
        };

        info!(
            %entity_type,
            total = summary.total,
            success_count = summary.success_count,
            error_count = summary.error_count,
            duration_ms = summary.duration_ms,
            "Reconciliation finished"
        );

        Ok(summary)
    }

    /// Run one attempt and move the item to its next state
    async fn attempt(&self, entity_type: EntityType, mut item: WorkItem) -> WorkItem {
        item.state = JobState::InFlight;
        item.attempts += 1;

        let mut job = SyncJobData::new(entity_type, item.entity_id.clone(), OperationType::Update);
        job.retry_count = item.attempts - 1;

        match self.processor.process(&job).await {
            Ok(()) => {
                item.state = JobState::Succeeded;
                item.last_error = None;
            }
            Err(err) => {
                item.last_error = Some(err.to_string());
                if self.policy.should_retry(&err, item.attempts) {
                    let delay = self.policy.delay_for(&err, item.attempts - 1);
                    debug!(
                        %entity_type,
                        entity_id = %item.entity_id,
                        attempt = item.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying entity later"
                    );
                    item.state = JobState::FailedRetryable;
                    item.ready_at = Some(Instant::now() + delay);
                } else {
                    item.state = JobState::FailedPermanent;
                }
            }
        }

        item
    }
}
