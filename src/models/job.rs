//! Sync job models
//!
//! This module defines the job descriptor carried through the per-kind queues
//! and the outcome and state types reported by adapters and the reconciler.

use super::entity::{EntityType, OperationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptor instructing the adapters to reconcile one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJobData {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation_type: OperationType,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl SyncJobData {
    /// Create a fresh job stamped with the current time
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        operation_type: OperationType,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            operation_type,
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    /// Copy of this job for re-insertion after a failed attempt
    pub fn retried(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

/// Result of one adapter call for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SyncOutcome {
    /// A new remote document was created
    Created {
        #[serde(rename = "remoteId")]
        remote_id: String,
    },
    /// An existing remote document was updated
    Updated {
        #[serde(rename = "remoteId")]
        remote_id: String,
    },
    /// The remote document was deleted
    Deleted {
        #[serde(rename = "remoteId")]
        remote_id: String,
    },
    /// Delete requested but nothing exists remotely
    NotFound,
    /// Nothing was sent, e.g. the default-language translation is missing
    Skipped { reason: String },
}

impl SyncOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        SyncOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            SyncOutcome::Created { remote_id }
            | SyncOutcome::Updated { remote_id }
            | SyncOutcome::Deleted { remote_id } => Some(remote_id),
            SyncOutcome::NotFound | SyncOutcome::Skipped { .. } => None,
        }
    }
}

/// Lifecycle of a unit of work in the queues and in the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    InFlight,
    Succeeded,
    FailedRetryable,
    FailedPermanent,
}

impl JobState {
    /// Whether the item will not be attempted again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::FailedPermanent)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::InFlight => write!(f, "in-flight"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::FailedRetryable => write!(f, "failed-retryable"),
            JobState::FailedPermanent => write!(f, "failed-permanent"),
        }
    }
}
