use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use super::{error_response, output::pcm_response, routing_error};
use crate::{
    common::{ApiError, RouteId},
    server::AppState,
};

const PATH: &str = "/v1/secondary";

fn default_video() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    #[serde(default = "default_video")]
    pub video: bool,
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub route: RouteId,
}

/// POST /v1/secondary
pub async fn open_secondary(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OpenRequest>,
) -> impl IntoResponse {
    let video = body.video;
    tracing::info!("POST {}: video={}", PATH, video);

    match state.engine.open_secondary(video).await {
        Ok(route) => (StatusCode::CREATED, Json(RouteResponse { route })).into_response(),
        Err(e) => routing_error(&e, PATH),
    }
}

/// DELETE /v1/secondary
pub async fn close_secondary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!("DELETE {}", PATH);
    match state.engine.close_secondary().await {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            ApiError::not_found("No secondary output is open", PATH),
        ),
    }
}

/// POST /v1/secondary/closed
pub async fn secondary_closed(State(state): State<Arc<AppState>>) -> StatusCode {
    tracing::info!("POST {}/closed", PATH);
    state.engine.notify_route_closed().await;
    StatusCode::NO_CONTENT
}

/// GET /v1/secondary/stream
pub async fn secondary_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!("GET {}/stream", PATH);
    match state.engine.subscribe_secondary_output() {
        Ok(track) => pcm_response(track, state.engine.session().config().sample_rate),
        Err(e) => routing_error(&e, &format!("{}/stream", PATH)),
    }
}
