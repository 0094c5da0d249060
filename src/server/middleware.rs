//! HTTP middleware for the admin API
//!
//! This module provides middleware for:
//! - Bearer token authentication of `/api` routes
//! - Request/response logging

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Instant;

use super::router::AppState;

/// Paths that should skip authentication
const AUTH_SKIP_PATHS: &[&str] = &["/health"];

/// Admin token middleware
///
/// Open when no `admin_token` is configured. Otherwise every request outside
/// [`AUTH_SKIP_PATHS`] must carry `Authorization: Bearer <admin_token>`.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthResponse> {
    let path = request.uri().path();

    if AUTH_SKIP_PATHS.iter().any(|p| path.starts_with(p)) {
        return Ok(next.run(request).await);
    }

    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            let token = header.trim_start_matches("Bearer ");
            if token == expected {
                Ok(next.run(request).await)
            } else {
                tracing::warn!(path = %path, "Rejected admin request with invalid token");
                Err(AuthResponse::invalid_token())
            }
        }
        Some(_) => Err(AuthResponse::unsupported_scheme()),
        None => Err(AuthResponse::missing_auth()),
    }
}

/// Authentication error response
#[derive(Debug)]
pub struct AuthResponse {
    status: StatusCode,
    message: &'static str,
}

impl AuthResponse {
    fn invalid_token() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Invalid token",
        }
    }

    fn missing_auth() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Missing authorization header",
        }
    }

    fn unsupported_scheme() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Unsupported authentication scheme",
        }
    }
}

impl IntoResponse for AuthResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Logging middleware function
///
/// Logs method, path, status code and response time of every request.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        "Request completed"
    );

    response
}
