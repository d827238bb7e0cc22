use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::routes::error_response;
use crate::{common::ApiError, server::AppState};

pub const API_VERSION: &str = "1";

/// Require the configured password in `Authorization`, if one is set.
pub async fn check_auth(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let Some(password) = state.config.server.password.as_deref() else {
        return next.run(req).await;
    };

    let supplied = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    if supplied == Some(password) {
        return next.run(req).await;
    }

    let path = req.uri().path().to_string();
    let reason = if supplied.is_some() {
        "invalid password"
    } else {
        "missing Authorization header"
    };
    warn!("Rejected {}: {}", path, reason);
    error_response(StatusCode::UNAUTHORIZED, ApiError::unauthorized(reason, path))
}

pub async fn add_response_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Canopy-Api-Version", HeaderValue::from_static(API_VERSION));
    response
}
