use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::{
    server::AppState,
    session::{PipSupport, PlatformCapabilities, StaticPlatform},
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitInfo {
    pub branch: String,
    pub commit: String,
    pub commit_time: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub version: String,
    pub build_time: u64,
    pub git: GitInfo,
    pub decoder: String,
    pub channels: Vec<String>,
    pub forests: Vec<String>,
    pub pip: PipSupport,
    pub connections: usize,
    pub uptime_ms: u64,
}

/// GET /v1/info
pub async fn get_info(State(state): State<Arc<AppState>>) -> Json<Info> {
    tracing::debug!("GET /v1/info");
    let platform = StaticPlatform::from_config(&state.config.platform);

    Json(Info {
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_time: option_env!("BUILD_TIME")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        git: GitInfo {
            branch: option_env!("GIT_BRANCH").unwrap_or("unknown").to_string(),
            commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
            commit_time: option_env!("GIT_COMMIT_TIME")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        },
        decoder: "symphonia".to_string(),
        channels: state
            .engine
            .player()
            .channel_names()
            .map(|c| c.to_string())
            .collect(),
        forests: state.config.forests.iter().map(|f| f.name.clone()).collect(),
        pip: platform.pip_support(),
        connections: state.connections.len(),
        uptime_ms: state.started.elapsed().as_millis() as u64,
    })
}

/// GET /version
pub async fn get_version() -> String {
    tracing::debug!("GET /version");
    env!("CARGO_PKG_VERSION").to_string()
}
