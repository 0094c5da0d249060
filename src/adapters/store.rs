//! Find-or-create-or-update-or-delete routing over a platform store
//!
//! [`RemoteStore`] is the per-platform wire layer. [`StoreAdapter`] wraps
//! one and owns everything the platforms have in common: translation checks,
//! remote lookup, reference resolution and the create/update/delete routing.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::document::{entity_slug, CmsDocument};
use super::traits::{CmsAdapter, SyncRequest};
use crate::config::LookupStrategy;
use crate::error::SyncError;
use crate::models::{EntityType, OperationType, SyncOutcome};

/// Handle on an existing remote document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRef {
    pub id: String,
    /// Optimistic-locking version, where the platform uses one
    pub version: Option<i64>,
    pub published: bool,
    /// Secondary id some platforms use in references
    pub uuid: Option<String>,
}

impl RemoteRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Remote field a lookup queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupField {
    ExternalId,
    Slug,
}

/// Wire-level operations of one CMS platform
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn platform(&self) -> &'static str;

    /// Find the document of `entity_type` whose `field` equals `value`
    async fn find(
        &self,
        entity_type: EntityType,
        field: LookupField,
        value: &str,
    ) -> Result<Option<RemoteRef>, SyncError>;

    /// Create a document; `related` is the resolved target of `doc.reference`
    async fn create(
        &self,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError>;

    async fn update(
        &self,
        existing: &RemoteRef,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError>;

    async fn delete(&self, entity_type: EntityType, existing: &RemoteRef) -> Result<(), SyncError>;
}

/// [`CmsAdapter`] implemented on top of a [`RemoteStore`]
pub struct StoreAdapter<S> {
    store: S,
    lookup: LookupStrategy,
    language: String,
}

impl<S: RemoteStore> StoreAdapter<S> {
    pub fn new(store: S, lookup: LookupStrategy, language: impl Into<String>) -> Self {
        Self {
            store,
            lookup,
            language: language.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve the remote document for an entity
    async fn locate(
        &self,
        entity_type: EntityType,
        external_id: &str,
        slug: Option<&str>,
    ) -> Result<Option<RemoteRef>, SyncError> {
        match (self.lookup, slug) {
            (LookupStrategy::Slug, Some(slug)) => {
                self.store.find(entity_type, LookupField::Slug, slug).await
            }
            (LookupStrategy::ExternalIdThenSlug, Some(slug)) => {
                match self
                    .store
                    .find(entity_type, LookupField::ExternalId, external_id)
                    .await?
                {
                    Some(found) => Ok(Some(found)),
                    None => self.store.find(entity_type, LookupField::Slug, slug).await,
                }
            }
            // No slug to go on: the external id is all there is
            _ => {
                self.store
                    .find(entity_type, LookupField::ExternalId, external_id)
                    .await
            }
        }
    }

    async fn sync_kind(
        &self,
        expected: EntityType,
        request: &SyncRequest,
    ) -> Result<SyncOutcome, SyncError> {
        if request.entity_type != expected {
            return Err(SyncError::InvalidData(format!(
                "{} request routed to {} sync",
                request.entity_type, expected
            )));
        }

        match request.operation_type {
            OperationType::Delete => self.delete(request).await,
            OperationType::Create | OperationType::Update => self.upsert(request).await,
        }
    }

    async fn delete(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        let slug = request.entity.as_ref().and_then(|entity| {
            entity
                .translation(&self.language)
                .map(|translation| entity_slug(entity, translation))
        });

        let existing = self
            .locate(request.entity_type, &request.entity_id, slug.as_deref())
            .await?;

        match existing {
            Some(remote) => {
                self.store.delete(request.entity_type, &remote).await?;
                info!(
                    adapter = self.store.platform(),
                    entity_type = %request.entity_type,
                    entity_id = %request.entity_id,
                    remote_id = %remote.id,
                    "Deleted CMS document"
                );
                Ok(SyncOutcome::Deleted {
                    remote_id: remote.id,
                })
            }
            None => {
                info!(
                    adapter = self.store.platform(),
                    entity_type = %request.entity_type,
                    entity_id = %request.entity_id,
                    "No CMS document to delete"
                );
                Ok(SyncOutcome::NotFound)
            }
        }
    }

    async fn upsert(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        let entity = request.entity.as_ref().ok_or_else(|| {
            SyncError::InvalidData(format!(
                "{} {} has no snapshot to sync",
                request.entity_type, request.entity_id
            ))
        })?;

        let doc = match CmsDocument::from_entity(entity, &self.language) {
            Ok(doc) => doc,
            Err(missing) => {
                warn!(
                    adapter = self.store.platform(),
                    entity_type = %request.entity_type,
                    entity_id = %request.entity_id,
                    language = %missing.language,
                    "Translation missing, skipping"
                );
                return Ok(SyncOutcome::skipped(missing.to_string()));
            }
        };

        let related = match &doc.reference {
            Some(reference) => {
                let found = self
                    .locate(reference.entity_type, &reference.external_id, None)
                    .await?;
                if found.is_none() {
                    debug!(
                        adapter = self.store.platform(),
                        field = reference.field,
                        target_type = %reference.entity_type,
                        target_id = %reference.external_id,
                        "Referenced document not in CMS yet, omitting reference"
                    );
                }
                found
            }
            None => None,
        };

        let existing = self
            .locate(doc.entity_type, &doc.external_id, Some(&doc.slug))
            .await?;

        match existing {
            Some(remote) => {
                if request.operation_type == OperationType::Create {
                    debug!(
                        adapter = self.store.platform(),
                        entity_id = %request.entity_id,
                        remote_id = %remote.id,
                        "Document already exists, updating instead of creating"
                    );
                }
                let updated = self.store.update(&remote, &doc, related.as_ref()).await?;
                info!(
                    adapter = self.store.platform(),
                    entity_type = %request.entity_type,
                    entity_id = %request.entity_id,
                    remote_id = %updated.id,
                    "Updated CMS document"
                );
                Ok(SyncOutcome::Updated {
                    remote_id: updated.id,
                })
            }
            None => {
                if request.operation_type == OperationType::Update {
                    debug!(
                        adapter = self.store.platform(),
                        entity_id = %request.entity_id,
                        "No document to update, creating"
                    );
                }
                let created = self.store.create(&doc, related.as_ref()).await?;
                info!(
                    adapter = self.store.platform(),
                    entity_type = %request.entity_type,
                    entity_id = %request.entity_id,
                    remote_id = %created.id,
                    "Created CMS document"
                );
                Ok(SyncOutcome::Created {
                    remote_id: created.id,
                })
            }
        }
    }
}

#[async_trait]
impl<S: RemoteStore> CmsAdapter for StoreAdapter<S> {
    fn name(&self) -> &str {
        self.store.platform()
    }

    async fn sync_product(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        self.sync_kind(EntityType::Product, request).await
    }

    async fn sync_product_variant(
        &self,
        request: &SyncRequest,
    ) -> Result<SyncOutcome, SyncError> {
        self.sync_kind(EntityType::ProductVariant, request).await
    }

    async fn sync_collection(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        self.sync_kind(EntityType::Collection, request).await
    }
}
