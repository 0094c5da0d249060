//! Sanity HTTP API store
//!
//! Lookups are GROQ queries; writes are transactions on the mutate endpoint.
//! Document ids are derived from the type and catalog id, so a create that
//! races an earlier one replaces the same document instead of duplicating it.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::document::{json_id, CmsDocument};
use super::store::{LookupField, RemoteRef, RemoteStore};
use crate::config::SanityConfig;
use crate::error::SyncError;
use crate::models::EntityType;
use crate::sync::http_client::{CmsHttpClient, CmsRequest};

pub struct SanityStore {
    client: CmsHttpClient,
    config: SanityConfig,
    external_id_field: String,
}

impl SanityStore {
    pub fn new(client: CmsHttpClient, config: SanityConfig, external_id_field: String) -> Self {
        Self {
            client,
            config,
            external_id_field,
        }
    }

    fn document_type(&self, entity_type: EntityType) -> &str {
        match entity_type {
            EntityType::Product => &self.config.document_types.product,
            EntityType::ProductVariant => &self.config.document_types.variant,
            EntityType::Collection => &self.config.document_types.collection,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/data/{}/{}",
            self.config.api_base(),
            self.config.api_version,
            action,
            self.config.dataset
        )
    }

    /// Deterministic document id, e.g. `product-42`
    pub fn document_id(&self, entity_type: EntityType, external_id: &str) -> String {
        format!("{}-{}", self.document_type(entity_type), external_id)
    }

    /// Fields written on both create and patch
    fn build_fields(&self, doc: &CmsDocument, related: Option<&RemoteRef>) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(self.external_id_field.clone(), json!(doc.external_id));
        fields.insert("name".into(), json!(doc.name));
        fields.insert("slug".into(), json!({ "_type": "slug", "current": doc.slug }));
        if let Some(description) = &doc.description {
            fields.insert("description".into(), json!(description));
        }
        for (key, value) in &doc.fields {
            fields.insert(key.clone(), value.clone());
        }
        if let (Some(reference), Some(target)) = (&doc.reference, related) {
            fields.insert(
                reference.field.to_string(),
                json!({ "_type": "reference", "_ref": target.id }),
            );
        }

        let translations: Vec<Value> = doc
            .other_translations()
            .map(|t| {
                json!({
                    "_key": t.language_code,
                    "languageCode": t.language_code,
                    "name": t.name,
                    "slug": doc.slug_for(t),
                    "description": t.description,
                })
            })
            .collect();
        fields.insert("translations".into(), Value::Array(translations));

        fields
    }

    async fn mutate(&self, mutation: Value) -> Result<Option<Value>, SyncError> {
        self.client
            .send(
                CmsRequest::post(self.endpoint("mutate"))
                    .query("returnIds", "true")
                    .json(json!({ "mutations": [mutation] })),
            )
            .await
    }
}

#[async_trait]
impl RemoteStore for SanityStore {
    fn platform(&self) -> &'static str {
        "sanity"
    }

    async fn find(
        &self,
        entity_type: EntityType,
        field: LookupField,
        value: &str,
    ) -> Result<Option<RemoteRef>, SyncError> {
        let path = match field {
            LookupField::ExternalId => self.external_id_field.as_str(),
            LookupField::Slug => "slug.current",
        };
        let query = format!("*[_type == $type && {} == $value][0]{{_id, _rev}}", path);

        let response = self
            .client
            .send(
                CmsRequest::get(self.endpoint("query"))
                    .query("query", query)
                    .query("$type", json!(self.document_type(entity_type)).to_string())
                    .query("$value", json!(value).to_string()),
            )
            .await?;

        let Some(result) = response.as_ref().map(|b| &b["result"]) else {
            return Ok(None);
        };
        Ok(json_id(&result["_id"]).map(RemoteRef::new))
    }

    async fn create(
        &self,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError> {
        let id = self.document_id(doc.entity_type, &doc.external_id);
        let mut body = self.build_fields(doc, related);
        body.insert("_id".into(), json!(id));
        body.insert("_type".into(), json!(self.document_type(doc.entity_type)));

        self.mutate(json!({ "createOrReplace": body })).await?;
        Ok(RemoteRef::new(id))
    }

    async fn update(
        &self,
        existing: &RemoteRef,
        doc: &CmsDocument,
        related: Option<&RemoteRef>,
    ) -> Result<RemoteRef, SyncError> {
        let set = self.build_fields(doc, related);
        self.mutate(json!({ "patch": { "id": existing.id, "set": set } }))
            .await?;
        Ok(existing.clone())
    }

    async fn delete(&self, _entity_type: EntityType, existing: &RemoteRef) -> Result<(), SyncError> {
        self.mutate(json!({ "delete": { "id": existing.id } })).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{CmsAdapter, StoreAdapter, SyncRequest};
    use crate::config::{LookupStrategy, RateLimitConfig};
    use crate::models::{CatalogEntity, Collection, OperationType, SyncOutcome, Translation};
    use crate::sync::RateLimiter;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const QUERY: &str = "/v2021-06-07/data/query/production";
    const MUTATE: &str = "/v2021-06-07/data/mutate/production";

    fn store(server: &MockServer) -> SanityStore {
        let mut config = SanityConfig::new("proj".into(), "sk-token".into());
        config.base_url = Some(server.uri());
        let rate = RateLimitConfig {
            min_interval_ms: 0,
            ..RateLimitConfig::default()
        };
        let client = CmsHttpClient::new(rate.clone(), Arc::new(RateLimiter::from_config(&rate)))
            .unwrap()
            .with_bearer_token("sk-token")
            .unwrap();
        SanityStore::new(client, config, "vendureId".into())
    }

    fn collection(parent: Option<&str>) -> CatalogEntity {
        CatalogEntity::Collection(Collection {
            id: "7".into(),
            parent_id: parent.map(String::from),
            position: 1,
            is_private: false,
            translations: vec![
                Translation::new("en", "Outdoor").with_slug("outdoor"),
                Translation::new("de", "Draussen"),
            ],
        })
    }

    // Test 1: Default API base uses the project host
    #[test]
    fn test_api_base_default() {
        let config = SanityConfig::new("abc123".into(), "t".into());
        assert_eq!(config.api_base(), "https://abc123.api.sanity.io");
    }

    // Test 2: Create replaces the deterministic document id
    #[tokio::test]
    async fn test_create_or_replace() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY))
            .and(query_param("$type", "\"collection\""))
            .and(query_param("$value", "\"7\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": null})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(MUTATE))
            .and(header("Authorization", "Bearer sk-token"))
            .and(body_partial_json(json!({"mutations": [{"createOrReplace": {
                "_id": "collection-7",
                "_type": "collection",
                "vendureId": "7",
                "slug": {"_type": "slug", "current": "outdoor"},
                "translations": [{"_key": "de", "name": "Draussen", "slug": "draussen"}]
            }}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transactionId": "tx1",
                "results": [{"id": "collection-7", "operation": "create"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = StoreAdapter::new(store(&server), LookupStrategy::ExternalId, "en");
        let outcome = adapter
            .sync_collection(&SyncRequest::upsert(OperationType::Create, collection(None)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Created {
                remote_id: "collection-7".into()
            }
        );
    }

    // Test 3: Existing documents are patched with a parent reference
    #[tokio::test]
    async fn test_patch_with_reference() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY))
            .and(query_param("$value", "\"2\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"_id": "collection-2", "_rev": "r1"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(QUERY))
            .and(query_param("$value", "\"7\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"_id": "drafts-free-id", "_rev": "r9"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(MUTATE))
            .and(body_partial_json(json!({"mutations": [{"patch": {
                "id": "drafts-free-id",
                "set": {"parent": {"_type": "reference", "_ref": "collection-2"}}
            }}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = StoreAdapter::new(store(&server), LookupStrategy::ExternalId, "en");
        let outcome = adapter
            .sync_collection(&SyncRequest::upsert(
                OperationType::Update,
                collection(Some("2")),
            ))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Updated {
                remote_id: "drafts-free-id".into()
            }
        );
    }

    // Test 4: Delete issues a delete mutation for the found id
    #[tokio::test]
    async fn test_delete_mutation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"_id": "collection-7"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(MUTATE))
            .and(body_partial_json(json!({"mutations": [{"delete": {"id": "collection-7"}}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = StoreAdapter::new(store(&server), LookupStrategy::ExternalId, "en");
        let outcome = adapter
            .sync_collection(&SyncRequest::delete(EntityType::Collection, "7"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Deleted {
                remote_id: "collection-7".into()
            }
        );
    }

    // Test 5: Slug lookups query slug.current
    #[tokio::test]
    async fn test_find_by_slug() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY))
            .and(query_param(
                "query",
                "*[_type == $type && slug.current == $value][0]{_id, _rev}",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"_id": "abc"}
            })))
            .mount(&server)
            .await;

        let store = store(&server);
        let found = store
            .find(EntityType::Product, LookupField::Slug, "chair")
            .await
            .unwrap();

        assert_eq!(found, Some(RemoteRef::new("abc")));
    }
}
