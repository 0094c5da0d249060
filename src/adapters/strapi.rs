//! Strapi REST API store
//!
//! Entries live under `/api/{pluralApiId}` and are wrapped in a `data`
//! envelope. Strapi 5 addresses entries by `documentId`; Strapi 4 only has
//! the numeric `id`, which is used when no `documentId` is returned.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::document::{json_id, CmsDocument};
use super::store::{LookupField, RemoteRef, RemoteStore};
use crate::config::StrapiConfig;
use crate::error::SyncError;
use crate::models::EntityType;
use crate::sync::http_client::{CmsHttpClient, CmsRequest};

pub struct StrapiStore {
    client: CmsHttpClient,
    config: StrapiConfig,
    external_id_field: String,
}

impl StrapiStore {
    pub fn new(client: CmsHttpClient, config: StrapiConfig, external_id_field: String) -> Self {
        Self {
            client,
            config,
            external_id_field,
        }
    }

    fn collection_url(&self, entity_type: EntityType) -> String {
        let plural = match entity_type {
            EntityType::Product => &self.config.collections.product,
            EntityType::ProductVariant => &self.config.collections.variant,
            EntityType::Collection => &self.config.collections.collection,
        };
        format!("{}/api/{}", self.config.base_url.trim_end_matches('/'), plural)
    }

    fn with_locale(&self, request: CmsRequest) -> CmsRequest {
        match &self.config.locale {
            Some(locale) => request.query("locale", locale.as_str()),
            None => request,
        }
    }

    fn build_data(&self, doc: &CmsDocument, related: Option<&RemoteRef>) -> Value {
        let mut data = Map::new();
        data.insert(self.external_id_field.clone(), json!(doc.external_id));
        data.insert("name".into(), json!(doc.name));
        data.insert("slug".into(), json!(doc.slug));
        if let Some(description) = &doc.description {
            data.insert("description".into(), json!(description));
        }
        for (key, value) in &doc.fields {
            data.insert(key.clone(), value.clone());
        }
        if let (Some(reference), Some(target)) = (&doc.reference, related) {
            data.insert(reference.field.to_string(), json!(target.id));
        }

        let translations: Vec<Value> = doc
            .other_translations()
            .map(|t| {
                json!({
                    "languageCode": t.language_code,
                    "name": t.name,
                    "slug": doc.slug_for(t),
                    "description": t.description,
                })
            })
            .collect();
        data.insert("translations".into(), Value::Array(translations));

        json!({ "data": data })
    }
}

/// `documentId` on Strapi 5, numeric `id` on Strapi 4
fn entry_ref(entry: &Value) -> Result<RemoteRef, SyncError> {
    json_id(&entry["documentId"])
        .or_else(|| json_id(&entry["id"]))
        .map(RemoteRef::new)
        .ok_or_else(|| SyncError::InvalidData("Strapi entry without id".to_string()))
}

#[async_trait]
impl RemoteStore for StrapiStore {
    fn platform(&self) -> &'static str {
        "strapi"
    }

    async fn find(
        &self,
        entity_type: EntityType,
        field: LookupField,
        value: &str,
    ) -> Result<Option<RemoteRef>, SyncError> {
        let field_name = match field {
            LookupField::ExternalId => self.external_id_field.as_str(),
            LookupField::Slug => "slug",
        };
        let request = CmsRequest::get(self.collection_url(entity_type))
            .query(format!("filters[{}][$eq]", field_name), value)
            .query("pagination[pageSize]", "1");

        let response = self.client.send(self.with_locale(request)).await?;
        match response.as_ref().and_then(|b| b["data"].get(0)) {
            Some(entry) => entry_ref(entry).map(Some),
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError> {
        let request = CmsRequest::post(self.collection_url(doc.entity_type))
            .json(self.build_data(doc, related));
        let response = self
            .client
            .send(self.with_locale(request))
            .await?
            .ok_or_else(|| SyncError::InvalidData("Empty Strapi create response".into()))?;

        entry_ref(&response["data"])
    }

    async fn update(
        &self,
        existing: &RemoteRef,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError> {
        let request = CmsRequest::put(format!(
            "{}/{}",
            self.collection_url(doc.entity_type),
            existing.id
        ))
        .json(self.build_data(doc, related));

        self.client.send(self.with_locale(request)).await?;
        Ok(existing.clone())
    }

    async fn delete(&self, entity_type: EntityType, existing: &RemoteRef) -> Result<(), SyncError> {
        let request =
            CmsRequest::delete(format!("{}/{}", self.collection_url(entity_type), existing.id));
        self.client.send(self.with_locale(request)).await?;
        Ok(())
    }
}
