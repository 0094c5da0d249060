//! Platform-neutral CMS document
//!
//! Every adapter starts from a [`CmsDocument`]: the entity's default-language
//! texts, all of its translations, the kind-specific scalar fields, and at
//! most one reference to another synced entity.

use serde_json::{Map, Value};

use crate::models::{CatalogEntity, EntityType, Translation};

/// Reference from one synced entity to another (variant to product, child
/// collection to parent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Field name on the referring document
    pub field: &'static str,
    pub entity_type: EntityType,
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmsDocument {
    pub entity_type: EntityType,
    /// Catalog id stored in the external-id field
    pub external_id: String,
    /// Language of `name`, `slug` and `description`
    pub language: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// Every translation, the default language included
    pub translations: Vec<Translation>,
    /// Kind-specific fields keyed by their remote (camelCase) name
    pub fields: Map<String, Value>,
    pub reference: Option<DocumentRef>,
    /// Slug used by translations that set none; `None` derives it from the name
    fallback_slug: Option<String>,
}

/// The entity has no translation in the required language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationMissing {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub language: String,
}

impl std::fmt::Display for TranslationMissing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} has no '{}' translation",
            self.entity_type, self.entity_id, self.language
        )
    }
}

impl CmsDocument {
    /// Build the document for `entity` in `language`
    pub fn from_entity(entity: &CatalogEntity, language: &str) -> Result<Self, TranslationMissing> {
        let translation = entity
            .translation(language)
            .ok_or_else(|| TranslationMissing {
                entity_type: entity.entity_type(),
                entity_id: entity.id().to_string(),
                language: language.to_string(),
            })?;

        let mut fields = Map::new();
        let mut reference = None;

        match entity {
            CatalogEntity::Product(p) => {
                fields.insert("enabled".into(), Value::Bool(p.enabled));
                if let Some(url) = &p.featured_asset_url {
                    fields.insert("featuredAssetUrl".into(), Value::String(url.clone()));
                }
            }
            CatalogEntity::ProductVariant(v) => {
                fields.insert("sku".into(), Value::String(v.sku.clone()));
                fields.insert("price".into(), Value::from(v.price));
                fields.insert("currencyCode".into(), Value::String(v.currency_code.clone()));
                fields.insert("stockOnHand".into(), Value::from(v.stock_on_hand));
                fields.insert("enabled".into(), Value::Bool(v.enabled));
                reference = Some(DocumentRef {
                    field: "product",
                    entity_type: EntityType::Product,
                    external_id: v.product_id.clone(),
                });
            }
            CatalogEntity::Collection(c) => {
                fields.insert("position".into(), Value::from(c.position));
                fields.insert("isPrivate".into(), Value::Bool(c.is_private));
                reference = c.parent_id.as_ref().map(|parent| DocumentRef {
                    field: "parent",
                    entity_type: EntityType::Collection,
                    external_id: parent.clone(),
                });
            }
        }

        let fallback_slug = fallback_slug(entity);
        let slug = slug_with_fallback(translation, fallback_slug.as_deref());

        Ok(Self {
            entity_type: entity.entity_type(),
            external_id: entity.id().to_string(),
            language: language.to_string(),
            name: translation.name.clone(),
            slug,
            description: translation.description.clone(),
            translations: entity.translations().to_vec(),
            fields,
            reference,
            fallback_slug,
        })
    }

    /// Translations other than the default language
    pub fn other_translations(&self) -> impl Iterator<Item = &Translation> {
        self.translations
            .iter()
            .filter(move |t| t.language_code != self.language)
    }

    /// Slug of one of this document's translations
    pub fn slug_for(&self, translation: &Translation) -> String {
        slug_with_fallback(translation, self.fallback_slug.as_deref())
    }
}

/// Slug stored for `entity` in the language of `translation`
///
/// An explicit non-empty slug wins. Otherwise variants use their SKU, which
/// is unique, and the other kinds use the translated name.
pub fn entity_slug(entity: &CatalogEntity, translation: &Translation) -> String {
    slug_with_fallback(translation, fallback_slug(entity).as_deref())
}

fn fallback_slug(entity: &CatalogEntity) -> Option<String> {
    match entity {
        CatalogEntity::ProductVariant(v) => Some(slugify(&v.sku)),
        CatalogEntity::Product(_) | CatalogEntity::Collection(_) => None,
    }
}

fn slug_with_fallback(translation: &Translation, fallback: Option<&str>) -> String {
    match translation.slug.as_deref().filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => fallback
            .map(str::to_string)
            .unwrap_or_else(|| slugify(&translation.name)),
    }
}

/// Lowercase ASCII slug: alphanumerics kept, runs of anything else become `-`
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Remote ids arrive as strings on some platforms and integers on others
pub fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Collection, Product, ProductVariant};
    use serde_json::json;

    fn product() -> CatalogEntity {
        CatalogEntity::Product(Product {
            id: "1".into(),
            enabled: true,
            translations: vec![
                Translation::new("en", "Oak Chair").with_description("Solid oak"),
                Translation::new("de", "Eichenstuhl").with_slug("eichenstuhl"),
            ],
            variant_ids: vec!["10".into()],
            featured_asset_url: None,
        })
    }

    // Test 1: Product document uses the default language and derives a slug
    #[test]
    fn test_product_document() {
        let doc = CmsDocument::from_entity(&product(), "en").unwrap();

        assert_eq!(doc.entity_type, EntityType::Product);
        assert_eq!(doc.external_id, "1");
        assert_eq!(doc.name, "Oak Chair");
        assert_eq!(doc.slug, "oak-chair");
        assert_eq!(doc.description.as_deref(), Some("Solid oak"));
        assert_eq!(doc.fields.get("enabled"), Some(&json!(true)));
        assert!(doc.reference.is_none());

        let others: Vec<_> = doc.other_translations().map(|t| t.language_code.as_str()).collect();
        assert_eq!(others, vec!["de"]);
    }

    // Test 2: Missing translation is reported, not defaulted
    #[test]
    fn test_translation_missing() {
        let err = CmsDocument::from_entity(&product(), "fr").unwrap_err();
        assert_eq!(err.language, "fr");
        assert_eq!(err.to_string(), "Product 1 has no 'fr' translation");
    }

    // Test 3: Variant document references its product
    #[test]
    fn test_variant_document() {
        let variant = CatalogEntity::ProductVariant(ProductVariant {
            id: "10".into(),
            product_id: "1".into(),
            sku: "OAK-CH/01".into(),
            price: 12999,
            currency_code: "EUR".into(),
            stock_on_hand: 4,
            enabled: false,
            translations: vec![Translation::new("en", "Oak Chair, natural")],
        });

        let doc = CmsDocument::from_entity(&variant, "en").unwrap();
        assert_eq!(doc.slug, "oak-ch-01");
        assert_eq!(doc.fields.get("price"), Some(&json!(12999)));
        assert_eq!(doc.fields.get("sku"), Some(&json!("OAK-CH/01")));
        assert_eq!(
            doc.reference,
            Some(DocumentRef {
                field: "product",
                entity_type: EntityType::Product,
                external_id: "1".into()
            })
        );
    }

    // Test 4: Root collection has no parent reference
    #[test]
    fn test_collection_document() {
        let collection = CatalogEntity::Collection(Collection {
            id: "3".into(),
            parent_id: None,
            position: 2,
            is_private: true,
            translations: vec![Translation::new("en", "Summer Sale").with_slug("summer")],
        });

        let doc = CmsDocument::from_entity(&collection, "en").unwrap();
        assert_eq!(doc.slug, "summer");
        assert_eq!(doc.fields.get("isPrivate"), Some(&json!(true)));
        assert!(doc.reference.is_none());
    }

    // Test 5: Slugify collapses punctuation and whitespace
    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  leading and trailing  "), "leading-and-trailing");
        assert_eq!(slugify("Crème brûlée"), "cr-me-br-l-e");
        assert_eq!(slugify("---"), "");
    }

    // Test 6: Remote ids from strings and numbers
    #[test]
    fn test_json_id() {
        assert_eq!(json_id(&json!("abc")), Some("abc".to_string()));
        assert_eq!(json_id(&json!(42)), Some("42".to_string()));
        assert_eq!(json_id(&json!("")), None);
        assert_eq!(json_id(&json!(null)), None);
    }

    // Test 7: Variant translations all fall back to the SKU slug
    #[test]
    fn test_variant_slug_consistent_across_translations() {
        let variant = CatalogEntity::ProductVariant(ProductVariant {
            id: "10".into(),
            product_id: "1".into(),
            sku: "OAK-CH/01".into(),
            price: 12999,
            currency_code: "EUR".into(),
            stock_on_hand: 4,
            enabled: true,
            translations: vec![
                Translation::new("en", "Oak Chair").with_slug(""),
                Translation::new("de", "Eichenstuhl"),
                Translation::new("fr", "Chaise").with_slug("chaise-chene"),
            ],
        });

        let doc = CmsDocument::from_entity(&variant, "en").unwrap();
        assert_eq!(doc.slug, "oak-ch-01");

        let en = variant.translation("en").unwrap();
        assert_eq!(entity_slug(&variant, en), doc.slug);

        let others: Vec<_> = doc.other_translations().map(|t| doc.slug_for(t)).collect();
        assert_eq!(others, vec!["oak-ch-01", "chaise-chene"]);
    }

    // Test 8: Products and collections fall back to the translated name
    #[test]
    fn test_name_slug_for_translations() {
        let doc = CmsDocument::from_entity(&product(), "en").unwrap();
        let de = doc.other_translations().next().unwrap();
        assert_eq!(doc.slug_for(de), "eichenstuhl");

        let blank = Translation::new("it", "Sedia di quercia").with_slug("");
        assert_eq!(doc.slug_for(&blank), "sedia-di-quercia");
    }
}
