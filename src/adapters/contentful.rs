//! Contentful Management API store
//!
//! Entries live under `/spaces/{space}/environments/{env}/entries`. Every
//! field is a locale map, writes carry the entry version for optimistic
//! locking, and entries must be unpublished before they can be deleted.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::document::{json_id, CmsDocument};
use super::store::{LookupField, RemoteRef, RemoteStore};
use crate::config::ContentfulConfig;
use crate::error::SyncError;
use crate::models::EntityType;
use crate::sync::http_client::{CmsHttpClient, CmsRequest};

const CONTENT_TYPE: &str = "application/vnd.contentful.management.v1+json";

pub struct ContentfulStore {
    client: CmsHttpClient,
    config: ContentfulConfig,
    external_id_field: String,
}

impl ContentfulStore {
    pub fn new(client: CmsHttpClient, config: ContentfulConfig, external_id_field: String) -> Self {
        Self {
            client,
            config,
            external_id_field,
        }
    }

    fn entries_url(&self) -> String {
        format!(
            "{}/spaces/{}/environments/{}/entries",
            self.config.base_url.trim_end_matches('/'),
            self.config.space_id,
            self.config.environment
        )
    }

    fn content_type(&self, entity_type: EntityType) -> &str {
        match entity_type {
            EntityType::Product => &self.config.content_types.product,
            EntityType::ProductVariant => &self.config.content_types.variant,
            EntityType::Collection => &self.config.content_types.collection,
        }
    }

    /// Contentful locale for a catalog language, if it is mapped
    fn locale_for(&self, language: &str, default_language: &str) -> Option<String> {
        match self.config.locale_map.get(language) {
            Some(locale) => Some(locale.clone()),
            None if language == default_language => Some(self.config.default_locale.clone()),
            None => None,
        }
    }

    fn build_fields(&self, doc: &CmsDocument, related: Option<&RemoteRef>) -> Value {
        let default_locale = self
            .locale_for(&doc.language, &doc.language)
            .unwrap_or_else(|| self.config.default_locale.clone());

        let mut names = Map::new();
        let mut slugs = Map::new();
        let mut descriptions = Map::new();

        names.insert(default_locale.clone(), json!(doc.name));
        slugs.insert(default_locale.clone(), json!(doc.slug));
        if let Some(description) = &doc.description {
            descriptions.insert(default_locale.clone(), json!(description));
        }

        for translation in doc.other_translations() {
            let Some(locale) = self.locale_for(&translation.language_code, &doc.language) else {
                continue;
            };
            names.insert(locale.clone(), json!(translation.name));
            slugs.insert(locale.clone(), json!(doc.slug_for(translation)));
            if let Some(description) = &translation.description {
                descriptions.insert(locale, json!(description));
            }
        }

        let mut fields = Map::new();
        fields.insert(
            self.external_id_field.clone(),
            json!({ &default_locale: doc.external_id }),
        );
        fields.insert("name".into(), Value::Object(names));
        fields.insert("slug".into(), Value::Object(slugs));
        if !descriptions.is_empty() {
            fields.insert("description".into(), Value::Object(descriptions));
        }
        for (key, value) in &doc.fields {
            fields.insert(key.clone(), json!({ &default_locale: value }));
        }
        if let (Some(reference), Some(target)) = (&doc.reference, related) {
            fields.insert(
                reference.field.to_string(),
                json!({ &default_locale: {
                    "sys": { "type": "Link", "linkType": "Entry", "id": target.id }
                }}),
            );
        }

        json!({ "fields": fields })
    }

    async fn publish(&self, entry: RemoteRef) -> Result<RemoteRef, SyncError> {
        if !self.config.publish {
            return Ok(entry);
        }
        let version = entry.version.unwrap_or(1);
        let response = self
            .client
            .send(
                CmsRequest::put(format!("{}/{}/published", self.entries_url(), entry.id))
                    .header("X-Contentful-Version", version.to_string()),
            )
            .await?;

        match response {
            Some(body) => entry_ref(&body),
            None => Ok(RemoteRef {
                published: true,
                ..entry
            }),
        }
    }
}

/// Read `sys.id`, `sys.version` and `sys.publishedVersion` of an entry
fn entry_ref(entry: &Value) -> Result<RemoteRef, SyncError> {
    let sys = &entry["sys"];
    let id = json_id(&sys["id"])
        .ok_or_else(|| SyncError::InvalidData("Contentful entry without sys.id".to_string()))?;
    Ok(RemoteRef {
        id,
        version: sys["version"].as_i64(),
        published: !sys["publishedVersion"].is_null(),
        uuid: None,
    })
}

#[async_trait]
impl RemoteStore for ContentfulStore {
    fn platform(&self) -> &'static str {
        "contentful"
    }

    async fn find(
        &self,
        entity_type: EntityType,
        field: LookupField,
        value: &str,
    ) -> Result<Option<RemoteRef>, SyncError> {
        let field_name = match field {
            LookupField::ExternalId => format!("fields.{}", self.external_id_field),
            LookupField::Slug => "fields.slug".to_string(),
        };

        let response = self
            .client
            .send(
                CmsRequest::get(self.entries_url())
                    .query("content_type", self.content_type(entity_type))
                    .query(field_name, value)
                    .query("limit", "1"),
            )
            .await?;

        match response.as_ref().and_then(|b| b["items"].get(0)) {
            Some(entry) => entry_ref(entry).map(Some),
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError> {
        let response = self
            .client
            .send(
                CmsRequest::post(self.entries_url())
                    .header("Content-Type", CONTENT_TYPE)
                    .header("X-Contentful-Content-Type", self.content_type(doc.entity_type))
                    .json(self.build_fields(doc, related)),
            )
            .await?
            .ok_or_else(|| SyncError::InvalidData("Empty Contentful create response".into()))?;

        self.publish(entry_ref(&response)?).await
    }

    async fn update(
        &self,
        existing: &RemoteRef,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError> {
        let mut request = CmsRequest::put(format!("{}/{}", self.entries_url(), existing.id))
            .header("Content-Type", CONTENT_TYPE)
            .json(self.build_fields(doc, related));
        if let Some(version) = existing.version {
            request = request.header("X-Contentful-Version", version.to_string());
        }

        let updated = match self.client.send(request).await? {
            Some(body) => entry_ref(&body)?,
            None => existing.clone(),
        };
        self.publish(updated).await
    }

    async fn delete(&self, _entity_type: EntityType, existing: &RemoteRef) -> Result<(), SyncError> {
        let mut version = existing.version;

        if existing.published {
            let mut request =
                CmsRequest::delete(format!("{}/{}/published", self.entries_url(), existing.id));
            if let Some(v) = version {
                request = request.header("X-Contentful-Version", v.to_string());
            }
            if let Some(body) = self.client.send(request).await? {
                version = entry_ref(&body)?.version;
            }
        }

        let mut request = CmsRequest::delete(format!("{}/{}", self.entries_url(), existing.id));
        if let Some(v) = version {
            request = request.header("X-Contentful-Version", v.to_string());
        }
        self.client.send(request).await?;
        Ok(())
    }
}
