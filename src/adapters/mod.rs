//! CMS platform adapters
//!
//! Each supported platform is a [`RemoteStore`] wired into a
//! [`StoreAdapter`], which gives every platform the same routing rules.

pub mod contentful;
pub mod document;
pub mod payload;
pub mod sanity;
pub mod store;
pub mod storyblok;
pub mod strapi;
pub mod traits;

pub use contentful::ContentfulStore;
pub use document::{CmsDocument, DocumentRef};
pub use payload::PayloadStore;
pub use sanity::SanityStore;
pub use store::{LookupField, RemoteRef, RemoteStore, StoreAdapter};
pub use storyblok::StoryblokStore;
pub use strapi::StrapiStore;
pub use traits::{dispatch, CmsAdapter, SyncRequest};

#[cfg(test)]
pub use traits::MockCmsAdapter;

use std::sync::Arc;
use tracing::info;

use crate::config::{CmsConfig, RateLimitConfig};
use crate::error::SyncError;
use crate::sync::http_client::CmsHttpClient;
use crate::sync::RateLimiter;

/// Build an adapter for every configured platform
///
/// Each adapter gets its own rate limiter and HTTP client.
pub fn from_config(
    cms: &CmsConfig,
    rate_limit: &RateLimitConfig,
    default_language: &str,
) -> Result<Vec<Arc<dyn CmsAdapter>>, SyncError> {
    let mut adapters: Vec<Arc<dyn CmsAdapter>> = Vec::new();

    let client = || -> Result<CmsHttpClient, SyncError> {
        CmsHttpClient::new(
            rate_limit.clone(),
            Arc::new(RateLimiter::from_config(rate_limit)),
        )
    };
    let field = || cms.external_id_field.clone();

    if let Some(config) = &cms.contentful {
        let http = client()?.with_bearer_token(&config.management_token)?;
        let store = ContentfulStore::new(http, config.clone(), field());
        adapters.push(Arc::new(StoreAdapter::new(store, cms.lookup, default_language)));
    }

    if let Some(config) = &cms.sanity {
        let http = client()?.with_bearer_token(&config.token)?;
        let store = SanityStore::new(http, config.clone(), field());
        adapters.push(Arc::new(StoreAdapter::new(store, cms.lookup, default_language)));
    }

    if let Some(config) = &cms.storyblok {
        let http = client()?.with_auth_header("Authorization", &config.management_token)?;
        let store = StoryblokStore::new(http, config.clone(), field());
        adapters.push(Arc::new(StoreAdapter::new(store, cms.lookup, default_language)));
    }

    if let Some(config) = &cms.strapi {
        let http = client()?.with_bearer_token(&config.api_token)?;
        let store = StrapiStore::new(http, config.clone(), field());
        adapters.push(Arc::new(StoreAdapter::new(store, cms.lookup, default_language)));
    }

    if let Some(config) = &cms.payload {
        let http = client()?.with_auth_header("Authorization", &PayloadStore::auth_value(config))?;
        let store = PayloadStore::new(http, config.clone(), field());
        adapters.push(Arc::new(StoreAdapter::new(store, cms.lookup, default_language)));
    }

    let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
    info!(adapters = ?names, "CMS adapters configured");

    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContentfulConfig, PayloadConfig, StrapiConfig};

    // Test 1: No platforms configured builds no adapters
    #[test]
    fn test_from_config_empty() {
        let adapters =
            from_config(&CmsConfig::default(), &RateLimitConfig::default(), "en").unwrap();
        assert!(adapters.is_empty());
    }

    // Test 2: Adapters come out in a fixed platform order
    #[test]
    fn test_from_config_order() {
        let cms = CmsConfig {
            contentful: Some(ContentfulConfig::new("sp".into(), "tok".into())),
            strapi: Some(StrapiConfig::new("http://strapi".into(), "tok".into())),
            payload: Some(PayloadConfig::new("http://payload".into(), "key".into())),
            ..CmsConfig::default()
        };

        let adapters = from_config(&cms, &RateLimitConfig::default(), "en").unwrap();
        let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["contentful", "strapi", "payload"]);
    }

    // Test 3: Tokens that are not valid header values are rejected
    #[test]
    fn test_from_config_bad_token() {
        let cms = CmsConfig {
            strapi: Some(StrapiConfig::new("http://strapi".into(), "bad\ntoken".into())),
            ..CmsConfig::default()
        };

        let result = from_config(&cms, &RateLimitConfig::default(), "en");
        assert!(matches!(result, Err(SyncError::InvalidData(_))));
    }
}
