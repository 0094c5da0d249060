//! HTTP router for the admin API
//!
//! This module defines the axum router that handles all HTTP requests.
//! It provides routes for:
//! - Health checks
//! - Queue and reconciliation status
//! - Catalog change webhooks
//! - Manual sync of one entity or of a whole entity kind

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::middleware::{admin_auth_middleware, logging_middleware};
use crate::error::SyncError;
use crate::events::{CatalogEvent, EventBus};
use crate::models::{EntityType, OperationType};
use crate::processor::{AdapterOutcome, SyncProcessor};
use crate::queue::SyncQueues;
use crate::sync::ReconcileHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Processor behind single-entity syncs
    pub processor: Arc<SyncProcessor>,

    /// Handle to the reconcile scheduler
    pub reconcile: ReconcileHandle,

    /// Per-kind sync queues
    pub queues: Arc<SyncQueues>,

    /// Bus the change listener consumes
    pub events: EventBus,

    /// Bearer token required on `/api` routes
    pub admin_token: Option<Arc<str>>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Result of a single-entity sync
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySyncResponse {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub outcomes: Vec<AdapterOutcome>,
}

/// JSON error body with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn from_sync_error(err: SyncError) -> Self {
        match err {
            SyncError::NotFound => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            other => Self::new(StatusCode::BAD_GATEWAY, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

fn parse_entity_type(raw: &str) -> Result<EntityType, ApiError> {
    raw.parse()
        .map_err(|e: String| ApiError::new(StatusCode::BAD_REQUEST, e))
}

/// Build the main application router
///
/// All routes except `/health` sit behind the admin token check.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/queues", get(api_queues_handler))
        .route("/api/events", post(api_publish_event_handler))
        .route("/api/sync/:entity_type", post(api_sync_all_handler))
        .route("/api/sync/:entity_type/:id", post(api_sync_entity_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

/// Health check endpoint handler
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Queue statistics and last reconciliation per kind
async fn api_queues_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "queues": state.queues.stats().await,
        "reconciliation": state.reconcile.status().await,
    }))
}

/// Catalog change webhook
async fn api_publish_event_handler(
    State(state): State<AppState>,
    Json(event): Json<CatalogEvent>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::debug!(
        entity_type = %event.entity_type,
        entity_id = %event.entity_id,
        operation = %event.operation_type,
        "Catalog event received"
    );

    if state.events.publish(event) == 0 {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "No change listener running",
        ));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": true })),
    ))
}

/// Sync one entity to every CMS right away
async fn api_sync_entity_handler(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
) -> Result<Json<EntitySyncResponse>, ApiError> {
    let entity_type = parse_entity_type(&entity_type)?;

    let outcomes = state
        .processor
        .sync_entity(entity_type, &id, OperationType::Update)
        .await
        .map_err(|e| {
            tracing::error!(%entity_type, entity_id = %id, error = %e, "Manual sync failed");
            ApiError::new(StatusCode::BAD_GATEWAY, e.to_string())
        })?;

    Ok(Json(EntitySyncResponse {
        entity_type,
        entity_id: id,
        outcomes,
    }))
}

/// Reconcile every entity of a kind
async fn api_sync_all_handler(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_type = parse_entity_type(&entity_type)?;

    let summary = state
        .reconcile
        .trigger(entity_type)
        .await
        .map_err(ApiError::from_sync_error)?;

    Ok(Json(summary))
}
