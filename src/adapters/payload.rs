//! Payload CMS REST API store
//!
//! Documents live under `/api/{collectionSlug}`. Localized fields are written
//! one locale at a time: the default language with the create or update, and
//! every other translation with a follow-up PATCH carrying `?locale=`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::document::{json_id, CmsDocument};
use super::store::{LookupField, RemoteRef, RemoteStore};
use crate::config::PayloadConfig;
use crate::error::SyncError;
use crate::models::EntityType;
use crate::sync::http_client::{CmsHttpClient, CmsRequest};

pub struct PayloadStore {
    client: CmsHttpClient,
    config: PayloadConfig,
    external_id_field: String,
}

impl PayloadStore {
    pub fn new(client: CmsHttpClient, config: PayloadConfig, external_id_field: String) -> Self {
        Self {
            client,
            config,
            external_id_field,
        }
    }

    /// Header value for Payload API-key auth
    pub fn auth_value(config: &PayloadConfig) -> String {
        format!("{} API-Key {}", config.auth_collection, config.api_key)
    }

    fn collection_url(&self, entity_type: EntityType) -> String {
        let slug = match entity_type {
            EntityType::Product => &self.config.collections.product,
            EntityType::ProductVariant => &self.config.collections.variant,
            EntityType::Collection => &self.config.collections.collection,
        };
        format!("{}/api/{}", self.config.base_url.trim_end_matches('/'), slug)
    }

    fn with_locale(&self, request: CmsRequest, locale: Option<&str>) -> CmsRequest {
        match locale.or(self.config.locale.as_deref()) {
            Some(locale) => request.query("locale", locale),
            None => request,
        }
    }

    fn build_body(&self, doc: &CmsDocument, related: Option<&RemoteRef>) -> Value {
        let mut body = Map::new();
        body.insert(self.external_id_field.clone(), json!(doc.external_id));
        body.insert("name".into(), json!(doc.name));
        body.insert("slug".into(), json!(doc.slug));
        if let Some(description) = &doc.description {
            body.insert("description".into(), json!(description));
        }
        for (key, value) in &doc.fields {
            body.insert(key.clone(), value.clone());
        }
        if let (Some(reference), Some(target)) = (&doc.reference, related) {
            body.insert(reference.field.to_string(), json!(target.id));
        }
        Value::Object(body)
    }

    /// Write the non-default translations onto an existing document
    async fn write_translations(
        &self,
        remote: &RemoteRef,
        doc: &CmsDocument,
    ) -> Result<(), SyncError> {
        let url = format!("{}/{}", self.collection_url(doc.entity_type), remote.id);
        for translation in doc.other_translations() {
            let mut body = json!({
                "name": translation.name,
                "slug": doc.slug_for(translation),
            });
            if let Some(description) = &translation.description {
                body["description"] = json!(description);
            }
            let request = CmsRequest::patch(url.as_str())
                .query("locale", translation.language_code.as_str())
                .json(body);
            self.client.send(request).await?;
        }
        Ok(())
    }
}

fn doc_ref(doc: &Value) -> Result<RemoteRef, SyncError> {
    json_id(&doc["id"])
        .map(RemoteRef::new)
        .ok_or_else(|| SyncError::InvalidData("Payload document without id".to_string()))
}

#[async_trait]
impl RemoteStore for PayloadStore {
    fn platform(&self) -> &'static str {
        "payload"
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
            .query(format!("where[{}][equals]", field_name), value)
            .query("limit", "1")
            .query("depth", "0");

        let response = self.client.send(self.with_locale(request, None)).await?;
        match response.as_ref().and_then(|b| b["docs"].get(0)) {
            Some(doc) => doc_ref(doc).map(Some),
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError> {
        let request = CmsRequest::post(self.collection_url(doc.entity_type))
            .json(self.build_body(doc, related));
        let response = self
            .client
            .send(self.with_locale(request, None))
            .await?
            .ok_or_else(|| SyncError::InvalidData("Empty Payload create response".into()))?;

        let created = doc_ref(&response["doc"])?;
        self.write_translations(&created, doc).await?;
        Ok(created)
    }

    async fn update(
        &self,
        existing: &RemoteRef,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError> {
        let request = CmsRequest::patch(format!(
            "{}/{}",
            self.collection_url(doc.entity_type),
            existing.id
        ))
        .json(self.build_body(doc, related));

        self.client.send(self.with_locale(request, None)).await?;
        self.write_translations(existing, doc).await?;
        Ok(existing.clone())
    }

    async fn delete(&self, entity_type: EntityType, existing: &RemoteRef) -> Result<(), SyncError> {
        self.client
            .send(CmsRequest::delete(format!(
                "{}/{}",
                self.collection_url(entity_type),
                existing.id
            )))
            .await?;
        Ok(())
    }
}
