//! Catalog entity models
//!
//! This module defines the entity kinds that are mirrored into CMS platforms
//! and the normalized entity snapshots adapters translate into documents.

use serde::{Deserialize, Serialize};

/// Kind of catalog entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Product,
    ProductVariant,
    Collection,
}

impl EntityType {
    /// All entity kinds, in dependency order (variants reference products)
    pub const ALL: [EntityType; 3] = [
        EntityType::Collection,
        EntityType::Product,
        EntityType::ProductVariant,
    ];

    /// Name of the per-kind sync queue
    pub fn queue_name(&self) -> &'static str {
        match self {
            EntityType::Product => "cms-product-sync",
            EntityType::ProductVariant => "cms-variant-sync",
            EntityType::Collection => "cms-collection-sync",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Product => "Product",
            EntityType::ProductVariant => "ProductVariant",
            EntityType::Collection => "Collection",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" => Ok(EntityType::Product),
            "productvariant" | "product-variant" | "product_variant" | "variant" => {
                Ok(EntityType::ProductVariant)
            }
            "collection" => Ok(EntityType::Collection),
            _ => Err(format!("Invalid entity type: {}", s)),
        }
    }
}

/// Kind of change that triggered a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Create => write!(f, "create"),
            OperationType::Update => write!(f, "update"),
            OperationType::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" | "created" => Ok(OperationType::Create),
            "update" | "updated" => Ok(OperationType::Update),
            "delete" | "deleted" => Ok(OperationType::Delete),
            _ => Err(format!("Invalid operation type: {}", s)),
        }
    }
}

/// Localized text of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub language_code: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Translation {
    pub fn new(language_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            language_code: language_code.into(),
            name: name.into(),
            slug: None,
            description: None,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn find_translation<'a>(translations: &'a [Translation], lang: &str) -> Option<&'a Translation> {
    translations.iter().find(|t| t.language_code == lang)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub enabled: bool,
    pub translations: Vec<Translation>,
    #[serde(default)]
    pub variant_ids: Vec<String>,
    #[serde(default)]
    pub featured_asset_url: Option<String>,
}

impl Product {
    pub fn translation(&self, lang: &str) -> Option<&Translation> {
        find_translation(&self.translations, lang)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub sku: String,
    /// Price in minor currency units
    pub price: i64,
    pub currency_code: String,
    pub stock_on_hand: i64,
    pub enabled: bool,
    pub translations: Vec<Translation>,
}

impl ProductVariant {
    pub fn translation(&self, lang: &str) -> Option<&Translation> {
        find_translation(&self.translations, lang)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub position: i64,
    pub is_private: bool,
    pub translations: Vec<Translation>,
}

impl Collection {
    pub fn translation(&self, lang: &str) -> Option<&Translation> {
        find_translation(&self.translations, lang)
    }
}

/// Snapshot of one catalog entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entityType", content = "entity")]
pub enum CatalogEntity {
    Product(Product),
    ProductVariant(ProductVariant),
    Collection(Collection),
}

impl CatalogEntity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            CatalogEntity::Product(_) => EntityType::Product,
            CatalogEntity::ProductVariant(_) => EntityType::ProductVariant,
            CatalogEntity::Collection(_) => EntityType::Collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CatalogEntity::Product(p) => &p.id,
            CatalogEntity::ProductVariant(v) => &v.id,
            CatalogEntity::Collection(c) => &c.id,
        }
    }

    pub fn translations(&self) -> &[Translation] {
        match self {
            CatalogEntity::Product(p) => &p.translations,
            CatalogEntity::ProductVariant(v) => &v.translations,
            CatalogEntity::Collection(c) => &c.translations,
        }
    }

    pub fn translation(&self, lang: &str) -> Option<&Translation> {
        find_translation(self.translations(), lang)
    }
}
