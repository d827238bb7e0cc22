use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use super::mix_error;
use crate::{
    engine::EngineSnapshot,
    server::AppState,
    session::EnvironmentEvent,
};

#[derive(Debug, Deserialize)]
pub struct LevelUpdate {
    pub level: f32,
}

#[derive(Debug, Deserialize)]
pub struct EnvironmentUpdate {
    pub event: EnvironmentEvent,
}

/// GET /v1/mix
pub async fn get_mix(State(state): State<Arc<AppState>>) -> Json<EngineSnapshot> {
    tracing::debug!("GET /v1/mix");
    Json(state.engine.snapshot().await)
}

/// PATCH /v1/channels/{channel}
pub async fn update_channel(
    Path(channel): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<LevelUpdate>,
) -> impl IntoResponse {
    tracing::debug!("PATCH /v1/channels/{}: {:.3}", channel, body.level);

    match state.engine.on_level_change(&channel, body.level) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => mix_error(&e, &format!("/v1/channels/{}", channel)),
    }
}

/// POST /v1/environment
pub async fn post_environment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnvironmentUpdate>,
) -> StatusCode {
    tracing::info!("POST /v1/environment: {:?}", body.event);
    state.engine.on_environment(body.event).await;
    StatusCode::NO_CONTENT
}
