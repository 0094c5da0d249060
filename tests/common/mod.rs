//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use catalog_cms_sync::adapters::{self, CmsAdapter};
use catalog_cms_sync::catalog::{CatalogSource, SqliteCatalog};
use catalog_cms_sync::config::{BackoffConfig, CmsConfig, RateLimitConfig, StrapiConfig};
use catalog_cms_sync::models::{Collection, Translation};
use catalog_cms_sync::otel::SyncMetrics;
use catalog_cms_sync::processor::SyncProcessor;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const STRAPI_TOKEN: &str = "strapi-test-token";

/// Backoff short enough for real-time tests
pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_backoff_ms: 5,
        max_backoff_ms: 20,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Rate limit settings without spacing between calls
pub fn no_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        min_interval_ms: 0,
        rate_limit_wait_secs: 1,
        request_timeout_secs: 5,
    }
}

/// Strapi adapter pointed at a mock server, built the way the binary builds it
pub fn strapi_adapters(server: &MockServer) -> Vec<Arc<dyn CmsAdapter>> {
    let cms = CmsConfig {
        strapi: Some(StrapiConfig::new(server.uri(), STRAPI_TOKEN.to_string())),
        ..Default::default()
    };
    adapters::from_config(&cms, &no_rate_limit(), "en").expect("Failed to build adapters")
}

pub fn collection(id: &str, name: &str) -> Collection {
    Collection {
        id: id.to_string(),
        parent_id: None,
        position: 0,
        is_private: false,
        translations: vec![Translation::new("en", name)],
    }
}

/// In-memory SQLite catalog holding the given collections
pub async fn seeded_catalog(collections: &[Collection]) -> Arc<SqliteCatalog> {
    let catalog = SqliteCatalog::in_memory()
        .await
        .expect("Failed to create test catalog");
    for c in collections {
        catalog
            .upsert_collection(c)
            .await
            .expect("Failed to seed collection");
    }
    Arc::new(catalog)
}

pub fn processor(
    catalog: Arc<dyn CatalogSource>,
    adapters: Vec<Arc<dyn CmsAdapter>>,
) -> Arc<SyncProcessor> {
    Arc::new(SyncProcessor::new(
        catalog,
        adapters,
        Arc::new(SyncMetrics::global()),
    ))
}

/// Strapi lookup for one collection finds nothing
pub async fn mount_collection_missing(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path("/api/collections"))
        .and(query_param("filters[vendureId][$eq]", id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [], "meta": {}})))
        .mount(server)
        .await;
}

/// Strapi lookup for one collection finds `document_id`
pub async fn mount_collection_found(server: &MockServer, id: &str, document_id: &str) {
    Mock::given(method("GET"))
        .and(path("/api/collections"))
        .and(query_param("filters[vendureId][$eq]", id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1, "documentId": document_id}]
        })))
        .mount(server)
        .await;
}

/// Poll `check` until it holds or the timeout passes
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}
