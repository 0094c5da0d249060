//! Read access to the e-commerce catalog
//!
//! Sync jobs carry only an entity id; the processor loads the current state
//! through [`CatalogSource`] when the job runs, so a burst of updates to one
//! entity never pushes stale data.

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::InMemoryCatalog;
pub use sqlite::SqliteCatalog;

use async_trait::async_trait;

use crate::error::CatalogError;
use crate::models::{CatalogEntity, EntityType};

/// Source of catalog entity snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Load one entity; `None` when it does not exist or was deleted
    async fn get_entity(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<CatalogEntity>, CatalogError>;

    /// Ids of every live entity of a kind
    async fn list_ids(&self, entity_type: EntityType) -> Result<Vec<String>, CatalogError>;
}
