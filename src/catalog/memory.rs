//! In-memory catalog
//!
//! Backs tests and demos where no SQLite file is available.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::CatalogSource;
use crate::error::CatalogError;
use crate::models::{CatalogEntity, EntityType};

/// Catalog held in ordered maps, one per entity kind
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    entities: RwLock<BTreeMap<(EntityType, String), CatalogEntity>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity
    pub async fn upsert(&self, entity: CatalogEntity) {
        let key = (entity.entity_type(), entity.id().to_string());
        self.entities.write().await.insert(key, entity);
    }

    /// Remove an entity, returning it if it existed
    pub async fn remove(&self, entity_type: EntityType, id: &str) -> Option<CatalogEntity> {
        self.entities
            .write()
            .await
            .remove(&(entity_type, id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn get_entity(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<CatalogEntity>, CatalogError> {
        Ok(self
            .entities
            .read()
            .await
            .get(&(entity_type, id.to_string()))
            .cloned())
    }

    async fn list_ids(&self, entity_type: EntityType) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .entities
            .read()
            .await
            .keys()
            .filter(|(kind, _)| *kind == entity_type)
            .map(|(_, id)| id.clone())
            .collect())
    }
}
