//! CMS adapter trait definition
//!
//! This module defines the trait every CMS integration implements and the
//! request handed to it for one entity change.

use async_trait::async_trait;

use crate::error::SyncError;
use crate::models::{CatalogEntity, EntityType, OperationType, SyncOutcome};

/// One entity change to mirror into a CMS
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation_type: OperationType,
    /// Current snapshot; absent for deletes of entities already gone
    pub entity: Option<CatalogEntity>,
}

impl SyncRequest {
    pub fn upsert(operation_type: OperationType, entity: CatalogEntity) -> Self {
        Self {
            entity_type: entity.entity_type(),
            entity_id: entity.id().to_string(),
            operation_type,
            entity: Some(entity),
        }
    }

    pub fn delete(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            operation_type: OperationType::Delete,
            entity: None,
        }
    }
}

/// Trait for CMS platform adapters
///
/// Adapters are responsible for:
/// - Translating catalog entities into the platform's document schema
/// - Finding the existing remote document for an entity
/// - Creating, updating or deleting it through the platform's REST API
///
/// Routing rules shared by all adapters:
/// - `create` on an entity that already exists remotely updates it
/// - `update` on an entity missing remotely creates it
/// - `delete` on an entity missing remotely is a no-op returning
///   [`SyncOutcome::NotFound`]
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CmsAdapter: Send + Sync {
    /// Platform name (e.g., "contentful", "sanity")
    fn name(&self) -> &str;

    async fn sync_product(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError>;

    async fn sync_product_variant(&self, request: &SyncRequest)
        -> Result<SyncOutcome, SyncError>;

    async fn sync_collection(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError>;
}

/// Route a request to the adapter method for its entity kind
pub async fn dispatch(
    adapter: &dyn CmsAdapter,
    request: &SyncRequest,
) -> Result<SyncOutcome, SyncError> {
    match request.entity_type {
        EntityType::Product => adapter.sync_product(request).await,
        EntityType::ProductVariant => adapter.sync_product_variant(request).await,
        EntityType::Collection => adapter.sync_collection(request).await,
    }
}
