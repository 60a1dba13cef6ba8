//! Bearer-token authentication middleware.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Require `Authorization: Bearer <API_KEY>` on the wrapped routes. When
/// no key is configured, authentication is disabled.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(request).await;
    };

    let path = request.uri().path().to_string();

    let Some(header_value) = request.headers().get(header::AUTHORIZATION) else {
        warn!(path, "Missing Authorization header");
        return ApiError::unauthorized("missing authorization header").into_response();
    };

    let Some(token) = header_value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        warn!(path, "Invalid Authorization header format");
        return ApiError::unauthorized("invalid authorization header format").into_response();
    };

    if token != expected {
        warn!(path, "Invalid API key");
        return ApiError::unauthorized("invalid api key").into_response();
    }

    next.run(request).await
}
