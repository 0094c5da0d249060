//! Configuration management for catalog-cms-sync
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Local catalog store
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Per-kind sync job queues
    #[serde(default)]
    pub queue: QueueConfig,

    /// Bulk reconciliation
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Periodic reconciliation
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Outbound rate limiting for CMS calls
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// CMS platform configurations
    #[serde(default)]
    pub cms: CmsConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables
    ///
    /// Service settings use the `CMS_SYNC_` prefix. A CMS platform is enabled
    /// when its credential variables are present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("CMS_SYNC_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("CMS_SYNC_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid port number".to_string()))?;
        }
        if let Ok(token) = std::env::var("CMS_SYNC_ADMIN_TOKEN") {
            config.server.admin_token = Some(token);
        }
        if let Ok(path) = std::env::var("CMS_SYNC_CATALOG_PATH") {
            config.catalog.path = path;
        }
        if let Ok(lang) = std::env::var("CMS_SYNC_DEFAULT_LANGUAGE") {
            config.catalog.default_language = lang;
        }
        if let Ok(level) = std::env::var("CMS_SYNC_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(enabled) = std::env::var("CMS_SYNC_OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(endpoint) = std::env::var("CMS_SYNC_OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        if let (Ok(space_id), Ok(token)) = (
            std::env::var("CONTENTFUL_SPACE_ID"),
            std::env::var("CONTENTFUL_MANAGEMENT_TOKEN"),
        ) {
            let mut contentful = ContentfulConfig::new(space_id, token);
            if let Ok(env) = std::env::var("CONTENTFUL_ENVIRONMENT") {
                contentful.environment = env;
            }
            config.cms.contentful = Some(contentful);
        }

        if let (Ok(project_id), Ok(token)) = (
            std::env::var("SANITY_PROJECT_ID"),
            std::env::var("SANITY_TOKEN"),
        ) {
            let mut sanity = SanityConfig::new(project_id, token);
            if let Ok(dataset) = std::env::var("SANITY_DATASET") {
                sanity.dataset = dataset;
            }
            config.cms.sanity = Some(sanity);
        }

        if let (Ok(space_id), Ok(token)) = (
            std::env::var("STORYBLOK_SPACE_ID"),
            std::env::var("STORYBLOK_MANAGEMENT_TOKEN"),
        ) {
            config.cms.storyblok = Some(StoryblokConfig::new(space_id, token));
        }

        if let (Ok(url), Ok(token)) = (std::env::var("STRAPI_URL"), std::env::var("STRAPI_TOKEN")) {
            config.cms.strapi = Some(StrapiConfig::new(url, token));
        }

        if let (Ok(url), Ok(key)) = (
            std::env::var("PAYLOAD_URL"),
            std::env::var("PAYLOAD_API_KEY"),
        ) {
            config.cms.payload = Some(PayloadConfig::new(url, key));
        }

        Ok(config)
    }

    /// Reject configurations the sync engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "queue.concurrency must be at least 1".to_string(),
            ));
        }
        if self.reconciler.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "reconciler.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.reconciler.concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "reconciler.concurrency must be at least 1".to_string(),
            ));
        }
        if self.scheduler.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.catalog.default_language.is_empty() {
            return Err(ConfigError::MissingRequired(
                "catalog.default_language".to_string(),
            ));
        }

        if let Some(c) = &self.cms.contentful {
            require("cms.contentful.space_id", &c.space_id)?;
            require("cms.contentful.management_token", &c.management_token)?;
        }
        if let Some(s) = &self.cms.sanity {
            require("cms.sanity.project_id", &s.project_id)?;
            require("cms.sanity.token", &s.token)?;
        }
        if let Some(s) = &self.cms.storyblok {
            require("cms.storyblok.space_id", &s.space_id)?;
            require("cms.storyblok.management_token", &s.management_token)?;
        }
        if let Some(s) = &self.cms.strapi {
            require("cms.strapi.base_url", &s.base_url)?;
            require("cms.strapi.api_token", &s.api_token)?;
        }
        if let Some(p) = &self.cms.payload {
            require("cms.payload.base_url", &p.base_url)?;
            require("cms.payload.api_key", &p.api_key)?;
        }

        Ok(())
    }
}

fn require(name: &str, value: &str) -> Result<(), ConfigError> {
    // Unexpanded `${VAR}` placeholders count as missing
    if value.trim().is_empty() || value.starts_with("${") {
        return Err(ConfigError::MissingRequired(name.to_string()));
    }
    Ok(())
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on `/api` routes; open when unset
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_token: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Local catalog store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogConfig {
    /// Path to the SQLite catalog file
    #[serde(default = "default_catalog_path")]
    pub path: String,

    /// Language whose translation is required for a CMS document
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            default_language: default_language(),
        }
    }
}

fn default_catalog_path() -> String {
    "/data/catalog.db".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

/// Backoff curve shared by the job queues and the reconciler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Whether to add jitter to backoff
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

/// Sync job queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Jobs processed in parallel per queue
    #[serde(default = "default_queue_concurrency")]
    pub concurrency: usize,

    /// Retries after the first attempt before a job is dropped
    #[serde(default = "default_queue_max_retries")]
    pub max_retries: u32,

    /// Maximum number of pending jobs per queue
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_queue_concurrency(),
            max_retries: default_queue_max_retries(),
            capacity: default_queue_capacity(),
            backoff: BackoffConfig::default(),
        }
    }
}

fn default_queue_concurrency() -> usize {
    1
}

fn default_queue_max_retries() -> u32 {
    3
}

fn default_queue_capacity() -> usize {
    10_000
}

/// Bulk reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcilerConfig {
    /// Attempts per entity before it is recorded as permanently failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Entities synced in parallel per group
    #[serde(default = "default_reconciler_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_reconciler_backoff")]
    pub backoff: BackoffConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            concurrency: default_reconciler_concurrency(),
            backoff: default_reconciler_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_reconciler_concurrency() -> usize {
    1
}

fn default_reconciler_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_backoff_ms: 500,
        max_backoff_ms: 30_000,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Periodic reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Whether periodic reconciliation runs at all
    #[serde(default)]
    pub enabled: bool,

    /// Interval between reconciliations of one entity kind
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// Reconcile every kind once shortly after startup
    #[serde(default)]
    pub run_on_startup: bool,

    /// Delay before the startup run
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Maximum random jitter added to each interval
    #[serde(default = "default_scheduler_jitter")]
    pub jitter_secs: u64,

    /// Timeout for a single reconciliation
    #[serde(default = "default_reconcile_timeout")]
    pub timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_reconcile_interval(),
            run_on_startup: false,
            initial_delay_secs: default_initial_delay(),
            jitter_secs: default_scheduler_jitter(),
            timeout_secs: default_reconcile_timeout(),
        }
    }
}

fn default_reconcile_interval() -> u64 {
    86_400
}

fn default_initial_delay() -> u64 {
    5
}

fn default_scheduler_jitter() -> u64 {
    60
}

fn default_reconcile_timeout() -> u64 {
    3600
}

/// Rate limiting configuration for CMS HTTP clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Minimum interval between requests to one CMS in milliseconds
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Wait time when rate limited without a Retry-After header (in seconds)
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_wait_secs: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval(),
            rate_limit_wait_secs: default_rate_limit_wait(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_min_interval() -> u64 {
    200
}

fn default_rate_limit_wait() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

/// How adapters locate the remote document for an entity
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookupStrategy {
    /// Query the stored external-id field
    #[default]
    ExternalId,
    /// Query the external-id field, then fall back to the slug
    ExternalIdThenSlug,
    /// Query the slug only
    Slug,
}

/// Remote schema names for the three entity kinds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaNames {
    pub product: String,
    pub variant: String,
    pub collection: String,
}

impl SchemaNames {
    fn new(product: &str, variant: &str, collection: &str) -> Self {
        Self {
            product: product.to_string(),
            variant: variant.to_string(),
            collection: collection.to_string(),
        }
    }
}

/// CMS platform configurations; a platform is active when its block is present
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CmsConfig {
    #[serde(default)]
    pub lookup: LookupStrategy,

    /// Remote field holding the catalog id
    #[serde(default = "default_external_id_field")]
    pub external_id_field: String,

    #[serde(default)]
    pub contentful: Option<ContentfulConfig>,

    #[serde(default)]
    pub sanity: Option<SanityConfig>,

    #[serde(default)]
    pub storyblok: Option<StoryblokConfig>,

    #[serde(default)]
    pub strapi: Option<StrapiConfig>,

    #[serde(default)]
    pub payload: Option<PayloadConfig>,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            lookup: LookupStrategy::default(),
            external_id_field: default_external_id_field(),
            contentful: None,
            sanity: None,
            storyblok: None,
            strapi: None,
            payload: None,
        }
    }
}

fn default_external_id_field() -> String {
    "vendureId".to_string()
}

/// Contentful Management API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentfulConfig {
    pub space_id: String,

    #[serde(default = "default_contentful_environment")]
    pub environment: String,

    pub management_token: String,

    #[serde(default = "default_contentful_url")]
    pub base_url: String,

    /// Contentful locale used for the catalog's default language
    #[serde(default = "default_contentful_locale")]
    pub default_locale: String,

    /// Catalog language code to Contentful locale
    #[serde(default)]
    pub locale_map: HashMap<String, String>,

    #[serde(default = "default_contentful_types")]
    pub content_types: SchemaNames,

    /// Publish entries after create or update
    #[serde(default = "default_true")]
    pub publish: bool,
}

impl ContentfulConfig {
    pub fn new(space_id: String, management_token: String) -> Self {
        Self {
            space_id,
            environment: default_contentful_environment(),
            management_token,
            base_url: default_contentful_url(),
            default_locale: default_contentful_locale(),
            locale_map: HashMap::new(),
            content_types: default_contentful_types(),
            publish: true,
        }
    }
}

fn default_contentful_environment() -> String {
    "master".to_string()
}

fn default_contentful_url() -> String {
    "https://api.contentful.com".to_string()
}

fn default_contentful_locale() -> String {
    "en-US".to_string()
}

fn default_contentful_types() -> SchemaNames {
    SchemaNames::new("product", "productVariant", "collection")
}

/// Sanity HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SanityConfig {
    pub project_id: String,

    #[serde(default = "default_sanity_dataset")]
    pub dataset: String,

    pub token: String,

    #[serde(default = "default_sanity_api_version")]
    pub api_version: String,

    /// Overrides `https://{project_id}.api.sanity.io`
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_sanity_types")]
    pub document_types: SchemaNames,
}

impl SanityConfig {
    pub fn new(project_id: String, token: String) -> Self {
        Self {
            project_id,
            dataset: default_sanity_dataset(),
            token,
            api_version: default_sanity_api_version(),
            base_url: None,
            document_types: default_sanity_types(),
        }
    }

    pub fn api_base(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.api.sanity.io", self.project_id),
        }
    }
}

fn default_sanity_dataset() -> String {
    "production".to_string()
}

fn default_sanity_api_version() -> String {
    "v2021-06-07".to_string()
}

fn default_sanity_types() -> SchemaNames {
    SchemaNames::new("product", "productVariant", "collection")
}

/// Storyblok Management API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryblokConfig {
    pub space_id: String,

    pub management_token: String,

    #[serde(default = "default_storyblok_url")]
    pub base_url: String,

    #[serde(default = "default_storyblok_components")]
    pub components: SchemaNames,

    /// Folder story ids per kind; stories land at the root when unset
    #[serde(default)]
    pub folders: StoryblokFolders,

    #[serde(default = "default_true")]
    pub publish: bool,
}

impl StoryblokConfig {
    pub fn new(space_id: String, management_token: String) -> Self {
        Self {
            space_id,
            management_token,
            base_url: default_storyblok_url(),
            components: default_storyblok_components(),
            folders: StoryblokFolders::default(),
            publish: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoryblokFolders {
    #[serde(default)]
    pub product: Option<u64>,
    #[serde(default)]
    pub variant: Option<u64>,
    #[serde(default)]
    pub collection: Option<u64>,
}

fn default_storyblok_url() -> String {
    "https://mapi.storyblok.com/v1".to_string()
}

fn default_storyblok_components() -> SchemaNames {
    SchemaNames::new("product", "product_variant", "collection")
}

/// Strapi REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrapiConfig {
    pub base_url: String,

    pub api_token: String,

    /// Plural API ids
    #[serde(default = "default_rest_collections")]
    pub collections: SchemaNames,

    #[serde(default)]
    pub locale: Option<String>,
}

impl StrapiConfig {
    pub fn new(base_url: String, api_token: String) -> Self {
        Self {
            base_url,
            api_token,
            collections: default_rest_collections(),
            locale: None,
        }
    }
}

/// Payload REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadConfig {
    pub base_url: String,

    pub api_key: String,

    /// Collection whose API keys authenticate requests
    #[serde(default = "default_payload_auth_collection")]
    pub auth_collection: String,

    #[serde(default = "default_rest_collections")]
    pub collections: SchemaNames,

    #[serde(default)]
    pub locale: Option<String>,
}

impl PayloadConfig {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            auth_collection: default_payload_auth_collection(),
            collections: default_rest_collections(),
            locale: None,
        }
    }
}

fn default_rest_collections() -> SchemaNames {
    SchemaNames::new("products", "product-variants", "collections")
}

fn default_payload_auth_collection() -> String {
    "users".to_string()
}

fn default_true() -> bool {
    true
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Whether to use insecure connection
    #[serde(default)]
    pub insecure: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            insecure: false,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "catalog-cms-sync".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
