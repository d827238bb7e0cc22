pub mod info;
pub mod mix;
pub mod output;
pub mod secondary;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::common::{ApiError, ContextError, MixError, RoutingError};

pub(crate) fn error_response(status: StatusCode, body: ApiError) -> Response {
    (status, Json(body)).into_response()
}

pub(crate) fn mix_error(err: &MixError, path: &str) -> Response {
    match err {
        MixError::NoSuchChannel(_) => {
            error_response(StatusCode::NOT_FOUND, ApiError::not_found(err.to_string(), path))
        }
        MixError::InvalidLevel(_) => {
            error_response(StatusCode::BAD_REQUEST, ApiError::bad_request(err.to_string(), path))
        }
        _ => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::internal(err.to_string(), path),
        ),
    }
}

pub(crate) fn routing_error(err: &RoutingError, path: &str) -> Response {
    match err {
        RoutingError::NoActiveRoute => {
            error_response(StatusCode::NOT_FOUND, ApiError::not_found(err.to_string(), path))
        }
        RoutingError::Unsupported | RoutingError::Surface(_) | RoutingError::AlreadyRegistered => {
            error_response(StatusCode::CONFLICT, ApiError::conflict(err.to_string(), path))
        }
        RoutingError::ContextMismatch { .. } | RoutingError::NoTracks => {
            error_response(StatusCode::BAD_REQUEST, ApiError::bad_request(err.to_string(), path))
        }
        _ => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::internal(err.to_string(), path),
        ),
    }
}

pub(crate) fn context_error(err: &ContextError, path: &str) -> Response {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        ApiError::unavailable(err.to_string(), path),
    )
}
