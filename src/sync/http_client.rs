//! Rate-limited JSON HTTP client for CMS APIs
//!
//! Every request passes through the adapter's [`RateLimiter`] before it is
//! sent. Responses are mapped onto [`SyncError`] so the queue and the
//! reconciler can decide whether to retry.

use super::rate_limiter::RateLimiter;
use crate::config::RateLimitConfig;
use crate::error::SyncError;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MAX_ERROR_BODY: usize = 500;

/// One outbound CMS request
#[derive(Debug, Clone)]
pub struct CmsRequest {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

impl CmsRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// HTTP client bound to one CMS platform
///
/// Features:
/// - Shared rate limiter gate per platform
/// - Fixed authorization header on every request
/// - Status code classification into retryable and permanent errors
#[derive(Debug, Clone)]
pub struct CmsHttpClient {
    client: Client,
    limiter: Arc<RateLimiter>,
    auth_header: Option<(HeaderName, HeaderValue)>,
    config: RateLimitConfig,
}

impl CmsHttpClient {
    /// Create a client with its own reqwest connection pool
    pub fn new(config: RateLimitConfig, limiter: Arc<RateLimiter>) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("catalog-cms-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config, limiter))
    }

    /// Create a client around an existing reqwest Client
    pub fn with_client(client: Client, config: RateLimitConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client,
            limiter,
            auth_header: None,
            config,
        }
    }

    /// Send `value` in `name` on every request
    pub fn with_auth_header(mut self, name: &str, value: &str) -> Result<Self, SyncError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SyncError::InvalidData(format!("Invalid header name: {}", e)))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| SyncError::InvalidData(format!("Invalid header value: {}", e)))?;
        value.set_sensitive(true);
        self.auth_header = Some((name, value));
        Ok(self)
    }

    /// Bearer token shorthand for [`with_auth_header`](Self::with_auth_header)
    pub fn with_bearer_token(self, token: &str) -> Result<Self, SyncError> {
        self.with_auth_header("Authorization", &format!("Bearer {}", token))
    }

    /// Send a request and decode the JSON response body
    ///
    /// Returns `None` for `204 No Content` and empty bodies.
    pub async fn send(&self, request: CmsRequest) -> Result<Option<Value>, SyncError> {
        self.limiter.acquire().await;

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .query(&request.query);

        if let Some((name, value)) = &self.auth_header {
            builder = builder.header(name.clone(), value.clone());
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %request.url, "Sending CMS request");
        let started = Instant::now();

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::NetworkTimeout
            } else if e.is_connect() {
                SyncError::ConnectionRefused
            } else {
                SyncError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Received CMS response"
        );

        match status {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| SyncError::Network(e.to_string()))?;
                if body.is_empty() {
                    return Ok(None);
                }
                serde_json::from_slice(&body)
                    .map(Some)
                    .map_err(|e| SyncError::InvalidData(format!("Invalid JSON response: {}", e)))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let wait = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(self.config.rate_limit_wait_secs);

                warn!(url = %request.url, retry_after = wait, "Rate limited by CMS");
                Err(SyncError::RateLimited(wait))
            }
            StatusCode::NOT_FOUND => {
                debug!(url = %request.url, "Resource not found (404)");
                Err(SyncError::NotFound)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(url = %request.url, status = status.as_u16(), "Unauthorized");
                Err(SyncError::Unauthorized)
            }
            status if status.is_server_error() => {
                warn!(url = %request.url, status = status.as_u16(), "Server error");
                Err(SyncError::ServerError(status.as_u16()))
            }
            status if status.is_client_error() => {
                let mut message = response.text().await.unwrap_or_default();
                truncate_at_char_boundary(&mut message, MAX_ERROR_BODY);
                warn!(
                    url = %request.url,
                    status = status.as_u16(),
                    body = %message,
                    "Request rejected"
                );
                Err(SyncError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
            status => {
                warn!(url = %request.url, status = status.as_u16(), "Unexpected status");
                Err(SyncError::ServerError(status.as_u16()))
            }
        }
    }

    /// Get current configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
