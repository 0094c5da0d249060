//! SQLite implementation of the CatalogSource trait
//!
//! This module provides a SQLite-backed catalog using rusqlite and
//! tokio-rusqlite for async operations. Deletes are soft: a row with
//! `deleted_at` set is invisible to readers.

use async_trait::async_trait;
use rusqlite::{OptionalExtension, Transaction};
use tokio_rusqlite::Connection;

use super::migrations::CREATE_SCHEMA;
use super::CatalogSource;
use crate::error::CatalogError;
use crate::models::{CatalogEntity, Collection, EntityType, Product, ProductVariant, Translation};

/// SQLite catalog store
pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    /// Open (and migrate) a catalog database
    ///
    /// Use `:memory:` for in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory catalog (useful for testing)
    pub async fn in_memory() -> Result<Self, CatalogError> {
        Self::new(":memory:").await
    }

    pub async fn upsert_product(&self, product: &Product) -> Result<(), CatalogError> {
        let product = product.clone();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"
                    INSERT INTO products (id, enabled, featured_asset_url, updated_at, deleted_at)
                    VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP, NULL)
                    ON CONFLICT(id) DO UPDATE SET
                        enabled = excluded.enabled,
                        featured_asset_url = excluded.featured_asset_url,
                        updated_at = CURRENT_TIMESTAMP,
                        deleted_at = NULL
                    "#,
                    rusqlite::params![product.id, product.enabled, product.featured_asset_url],
                )?;
                replace_translations(&tx, EntityType::Product, &product.id, &product.translations)?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    pub async fn upsert_variant(&self, variant: &ProductVariant) -> Result<(), CatalogError> {
        let variant = variant.clone();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"
                    INSERT INTO product_variants
                    (id, product_id, sku, price, currency_code, stock_on_hand, enabled, updated_at, deleted_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CURRENT_TIMESTAMP, NULL)
                    ON CONFLICT(id) DO UPDATE SET
                        product_id = excluded.product_id,
                        sku = excluded.sku,
                        price = excluded.price,
                        currency_code = excluded.currency_code,
                        stock_on_hand = excluded.stock_on_hand,
                        enabled = excluded.enabled,
                        updated_at = CURRENT_TIMESTAMP,
                        deleted_at = NULL
                    "#,
                    rusqlite::params![
                        variant.id,
                        variant.product_id,
                        variant.sku,
                        variant.price,
                        variant.currency_code,
                        variant.stock_on_hand,
                        variant.enabled
                    ],
                )?;
                replace_translations(
                    &tx,
                    EntityType::ProductVariant,
                    &variant.id,
                    &variant.translations,
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    pub async fn upsert_collection(&self, collection: &Collection) -> Result<(), CatalogError> {
        let collection = collection.clone();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"
                    INSERT INTO collections (id, parent_id, position, is_private, updated_at, deleted_at)
                    VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP, NULL)
                    ON CONFLICT(id) DO UPDATE SET
                        parent_id = excluded.parent_id,
                        position = excluded.position,
                        is_private = excluded.is_private,
                        updated_at = CURRENT_TIMESTAMP,
                        deleted_at = NULL
                    "#,
                    rusqlite::params![
                        collection.id,
                        collection.parent_id,
                        collection.position,
                        collection.is_private
                    ],
                )?;
                replace_translations(
                    &tx,
                    EntityType::Collection,
                    &collection.id,
                    &collection.translations,
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    /// Mark an entity deleted
    ///
    /// Returns false when no live row matched.
    pub async fn soft_delete(&self, entity_type: EntityType, id: &str) -> Result<bool, CatalogError> {
        let id = id.to_string();
        let table = table_name(entity_type);

        self.conn
            .call(move |conn| {
                let count = conn.execute(
                    &format!(
                        "UPDATE {} SET deleted_at = CURRENT_TIMESTAMP WHERE id = ?1 AND deleted_at IS NULL",
                        table
                    ),
                    [&id],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Into::into)
    }
}

fn table_name(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Product => "products",
        EntityType::ProductVariant => "product_variants",
        EntityType::Collection => "collections",
    }
}

fn replace_translations(
    tx: &Transaction<'_>,
    entity_type: EntityType,
    entity_id: &str,
    translations: &[Translation],
) -> rusqlite::Result<()> {
    tx.execute(
        "DELETE FROM translations WHERE entity_type = ?1 AND entity_id = ?2",
        rusqlite::params![entity_type.as_str(), entity_id],
    )?;
    let mut stmt = tx.prepare(
        r#"
        INSERT INTO translations (entity_type, entity_id, language_code, name, slug, description)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )?;
    for t in translations {
        stmt.execute(rusqlite::params![
            entity_type.as_str(),
            entity_id,
            t.language_code,
            t.name,
            t.slug,
            t.description
        ])?;
    }
    Ok(())
}

fn load_translations(
    conn: &rusqlite::Connection,
    entity_type: EntityType,
    entity_id: &str,
) -> rusqlite::Result<Vec<Translation>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT language_code, name, slug, description
        FROM translations
        WHERE entity_type = ?1 AND entity_id = ?2
        ORDER BY language_code
        "#,
    )?;

    let rows = stmt
        .query_map(rusqlite::params![entity_type.as_str(), entity_id], |row| {
            Ok(Translation {
                language_code: row.get(0)?,
                name: row.get(1)?,
                slug: row.get(2)?,
                description: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn load_product(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Product>> {
    let row = conn
        .query_row(
            "SELECT id, enabled, featured_asset_url FROM products WHERE id = ?1 AND deleted_at IS NULL",
            [id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((id, enabled, featured_asset_url)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id FROM product_variants WHERE product_id = ?1 AND deleted_at IS NULL ORDER BY id",
    )?;
    let variant_ids = stmt
        .query_map([&id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    let translations = load_translations(conn, EntityType::Product, &id)?;

    Ok(Some(Product {
        id,
        enabled,
        translations,
        variant_ids,
        featured_asset_url,
    }))
}

fn load_variant(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<ProductVariant>> {
    let variant = conn
        .query_row(
            r#"
            SELECT id, product_id, sku, price, currency_code, stock_on_hand, enabled
            FROM product_variants
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
            [id],
            |row| {
                Ok(ProductVariant {
                    id: row.get(0)?,
                    product_id: row.get(1)?,
                    sku: row.get(2)?,
                    price: row.get(3)?,
                    currency_code: row.get(4)?,
                    stock_on_hand: row.get(5)?,
                    enabled: row.get(6)?,
                    translations: Vec::new(),
                })
            },
        )
        .optional()?;

    match variant {
        Some(mut v) => {
            v.translations = load_translations(conn, EntityType::ProductVariant, &v.id)?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

fn load_collection(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Collection>> {
    let collection = conn
        .query_row(
            r#"
            SELECT id, parent_id, position, is_private
            FROM collections
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
            [id],
            |row| {
                Ok(Collection {
                    id: row.get(0)?,
                    parent_id: row.get(1)?,
                    position: row.get(2)?,
                    is_private: row.get(3)?,
                    translations: Vec::new(),
                })
            },
        )
        .optional()?;

    match collection {
        Some(mut c) => {
            c.translations = load_translations(conn, EntityType::Collection, &c.id)?;
            Ok(Some(c))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl CatalogSource for SqliteCatalog {
    async fn get_entity(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<CatalogEntity>, CatalogError> {
        let id = id.to_string();

        self.conn
            .call(move |conn| {
                let entity = match entity_type {
                    EntityType::Product => load_product(conn, &id)?.map(CatalogEntity::Product),
                    EntityType::ProductVariant => {
                        load_variant(conn, &id)?.map(CatalogEntity::ProductVariant)
                    }
                    EntityType::Collection => {
                        load_collection(conn, &id)?.map(CatalogEntity::Collection)
                    }
                };
                Ok(entity)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_ids(&self, entity_type: EntityType) -> Result<Vec<String>, CatalogError> {
        // Parents first so child references resolve during bulk runs
        let sql = match entity_type {
            EntityType::Product => "SELECT id FROM products WHERE deleted_at IS NULL ORDER BY id",
            EntityType::ProductVariant => {
                "SELECT id FROM product_variants WHERE deleted_at IS NULL ORDER BY id"
            }
            EntityType::Collection => {
                "SELECT id FROM collections WHERE deleted_at IS NULL \
                 ORDER BY parent_id IS NOT NULL, position, id"
            }
        };

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(sql)?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(ids)
            })
            .await
            .map_err(Into::into)
    }
}
