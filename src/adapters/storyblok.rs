//! Storyblok Management API store
//!
//! Entities are stories whose `content` blok carries the component name and
//! fields. Translations use field-level `__i18n__{lang}` keys and translated
//! slugs. References between stories are stored as story UUIDs.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::document::{json_id, CmsDocument};
use super::store::{LookupField, RemoteRef, RemoteStore};
use crate::config::StoryblokConfig;
use crate::error::SyncError;
use crate::models::EntityType;
use crate::sync::http_client::{CmsHttpClient, CmsRequest};

pub struct StoryblokStore {
    client: CmsHttpClient,
    config: StoryblokConfig,
    external_id_field: String,
}

impl StoryblokStore {
    pub fn new(client: CmsHttpClient, config: StoryblokConfig, external_id_field: String) -> Self {
        Self {
            client,
            config,
            external_id_field,
        }
    }

    fn stories_url(&self) -> String {
        format!(
            "{}/spaces/{}/stories",
            self.config.base_url.trim_end_matches('/'),
            self.config.space_id
        )
    }

    fn component(&self, entity_type: EntityType) -> &str {
        match entity_type {
            EntityType::Product => &self.config.components.product,
            EntityType::ProductVariant => &self.config.components.variant,
            EntityType::Collection => &self.config.components.collection,
        }
    }

    fn folder(&self, entity_type: EntityType) -> Option<u64> {
        match entity_type {
            EntityType::Product => self.config.folders.product,
            EntityType::ProductVariant => self.config.folders.variant,
            EntityType::Collection => self.config.folders.collection,
        }
    }

    fn build_story(&self, doc: &CmsDocument, related: Option<&RemoteRef>) -> Value {
        let mut content = Map::new();
        content.insert("component".into(), json!(self.component(doc.entity_type)));
        content.insert(self.external_id_field.clone(), json!(doc.external_id));
        content.insert("name".into(), json!(doc.name));
        if let Some(description) = &doc.description {
            content.insert("description".into(), json!(description));
        }
        for (key, value) in &doc.fields {
            content.insert(key.clone(), value.clone());
        }
        if let (Some(reference), Some(target)) = (&doc.reference, related) {
            let target_id = target.uuid.clone().unwrap_or_else(|| target.id.clone());
            content.insert(reference.field.to_string(), json!(target_id));
        }

        let mut translated_slugs = Vec::new();
        for translation in doc.other_translations() {
            let lang = &translation.language_code;
            content.insert(format!("name__i18n__{}", lang), json!(translation.name));
            if let Some(description) = &translation.description {
                content.insert(format!("description__i18n__{}", lang), json!(description));
            }
            translated_slugs.push(json!({
                "lang": lang,
                "name": translation.name,
                "slug": doc.slug_for(translation),
            }));
        }

        let mut story = Map::new();
        story.insert("name".into(), json!(doc.name));
        story.insert("slug".into(), json!(doc.slug));
        if let Some(folder) = self.folder(doc.entity_type) {
            story.insert("parent_id".into(), json!(folder));
        }
        story.insert("content".into(), Value::Object(content));
        if !translated_slugs.is_empty() {
            story.insert(
                "translated_slugs_attributes".into(),
                Value::Array(translated_slugs),
            );
        }

        let mut body = json!({ "story": story });
        if self.config.publish {
            body["publish"] = json!(1);
        }
        body
    }
}

fn story_ref(story: &Value) -> Result<RemoteRef, SyncError> {
    let id = json_id(&story["id"])
        .ok_or_else(|| SyncError::InvalidData("Storyblok story without id".to_string()))?;
    Ok(RemoteRef {
        id,
        version: None,
        published: story["published"].as_bool().unwrap_or(false),
        uuid: story["uuid"].as_str().map(String::from),
    })
}

#[async_trait]
impl RemoteStore for StoryblokStore {
    fn platform(&self) -> &'static str {
        "storyblok"
    }

    async fn find(
        &self,
        entity_type: EntityType,
        field: LookupField,
        value: &str,
    ) -> Result<Option<RemoteRef>, SyncError> {
        let request = CmsRequest::get(self.stories_url())
            .query("contain_component", self.component(entity_type))
            .query("per_page", "1");
        let request = match field {
            LookupField::ExternalId => request.query(
                format!("filter_query[{}][in]", self.external_id_field),
                value,
            ),
            LookupField::Slug => request.query("with_slug", value),
        };

        let response = self.client.send(request).await?;
        match response.as_ref().and_then(|b| b["stories"].get(0)) {
            Some(story) => story_ref(story).map(Some),
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
            .send(CmsRequest::post(self.stories_url()).json(self.build_story(doc, related)))
            .await?
            .ok_or_else(|| SyncError::InvalidData("Empty Storyblok create response".into()))?;

        story_ref(&response["story"])
    }

    async fn update(
        &self,
        existing: &RemoteRef,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError> {
        let response = self
            .client
            .send(
                CmsRequest::put(format!("{}/{}", self.stories_url(), existing.id))
                    .json(self.build_story(doc, related)),
            )
            .await?;

        match response {
            Some(body) if body["story"].is_object() => story_ref(&body["story"]),
            _ => Ok(existing.clone()),
        }
    }

    async fn delete(&self, _entity_type: EntityType, existing: &RemoteRef) -> Result<(), SyncError> {
        self.client
            .send(CmsRequest::delete(format!(
                "{}/{}",
                self.stories_url(),
                existing.id
            )))
            .await?;
        Ok(())
    }
}
