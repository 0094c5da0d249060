//! Outbound synchronization infrastructure
//!
//! Shared plumbing for talking to CMS platforms and for running
//! reconciliations on a schedule.
//!
//! # Components
//!
//! - [`rate_limiter`]: Minimum spacing between outbound calls of one adapter
//! - [`http_client`]: Rate-limited HTTP client mapping CMS responses onto [`SyncError`](crate::error::SyncError)
//! - [`retry`]: Retry policy with capped exponential backoff
//! - [`scheduler`]: Periodic reconcile scheduler with jitter and manual triggers
//!
//! # Example
//!
//! ```ignore
//! use catalog_cms_sync::config::RateLimitConfig;
//! use catalog_cms_sync::sync::{CmsHttpClient, CmsRequest, RateLimiter};
//! use std::sync::Arc;
//!
//! let config = RateLimitConfig::default();
//! let limiter = Arc::new(RateLimiter::from_config(&config));
//! let client = CmsHttpClient::new(config, limiter)?.with_bearer_token("token")?;
//!
//! let body = client
//!     .send(CmsRequest::get("https://cms.example.com/api/products").query("limit", "1"))
//!     .await?;
//! ```

pub mod http_client;
pub mod rate_limiter;
pub mod retry;
pub mod scheduler;

pub use http_client::{CmsHttpClient, CmsRequest};
pub use rate_limiter::RateLimiter;
pub use retry::{RateLimitHint, RetryPolicy};
pub use scheduler::{Reconcile, ReconcileHandle, ReconcileScheduler, ReconcileStatus};
