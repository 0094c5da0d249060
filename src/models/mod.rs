//! Domain models for catalog-cms-sync
//!
//! This module contains the catalog entities and sync job types used
//! throughout the application.

pub mod entity;
pub mod job;

// Re-export commonly used types
pub use entity::{
    CatalogEntity, Collection, EntityType, OperationType, Product, ProductVariant, Translation,
};
pub use job::{JobState, SyncJobData, SyncOutcome};
