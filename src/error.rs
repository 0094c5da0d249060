//! Application error types for catalog-cms-sync
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Catalog (local entity store) errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// SQLite error
    #[error("Catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection-level error from the async SQLite wrapper
    #[error("Catalog connection error: {0}")]
    Connection(String),

    /// Stored row could not be mapped onto an entity
    #[error("Invalid catalog data: {0}")]
    InvalidData(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<tokio_rusqlite::Error> for CatalogError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => CatalogError::Sqlite(e),
            other => CatalogError::Connection(other.to_string()),
        }
    }
}

/// Errors raised while talking to a CMS or processing a sync job
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Network timeout
    #[error("Network timeout")]
    NetworkTimeout,

    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Rate limited by the CMS
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Server error
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// The CMS rejected the request (4xx other than 401/403/404/429)
    #[error("Request rejected: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Invalid data received or produced
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Resource not found
    #[error("Resource not found")]
    NotFound,

    /// Unauthorized
    #[error("Unauthorized")]
    Unauthorized,

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),

    /// Reading the local catalog failed
    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl From<CatalogError> for SyncError {
    fn from(err: CatalogError) -> Self {
        SyncError::Catalog(err.to_string())
    }
}

/// Job queue errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueueError {
    /// Queue was shut down
    #[error("Queue {0} is closed")]
    Closed(String),

    /// Queue is at capacity
    #[error("Queue {0} is full")]
    Full(String),

    /// No queue registered for the requested name
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),
}

/// OpenTelemetry-related errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Application-level error type
///
/// This is the main error type used throughout the application.
/// It aggregates all domain-specific error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Catalog error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Sync error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Queue error
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            // Retryable errors
            SyncError::NetworkTimeout => true,
            SyncError::ConnectionRefused => true,
            SyncError::RateLimited(_) => true,
            SyncError::ServerError(code) if *code >= 500 => true,
            SyncError::Network(_) => true,
            // A locked or busy database clears up on its own
            SyncError::Catalog(_) => true,

            // Non-retryable errors
            SyncError::ServerError(_) => false,
            SyncError::Rejected { .. } => false,
            SyncError::InvalidData(_) => false,
            SyncError::NotFound => false,
            SyncError::Unauthorized => false,
        }
    }
}
