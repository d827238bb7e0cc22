use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch, post, put},
};

use crate::{
    server::AppState,
    transport::{
        middleware::{add_response_headers, check_auth},
        routes::{info, mix, output, secondary},
        websocket_server::websocket_handler,
    },
};

const API_V1: &str = "/v1";

pub fn router(state: Arc<AppState>) -> Router {
    let v1_routes = Router::new()
        .route("/info", get(info::get_info))
        .route("/mix", get(mix::get_mix))
        .route("/channels/{channel}", patch(mix::update_channel))
        .route("/environment", post(mix::post_environment))
        .route(
            "/secondary",
            post(secondary::open_secondary).delete(secondary::close_secondary),
        )
        .route("/secondary/closed", post(secondary::secondary_closed))
        .route("/secondary/stream", get(secondary::secondary_stream))
        .route("/output/stream", get(output::output_stream))
        .route("/output/muted", put(output::set_muted))
        .route("/events", get(websocket_handler));

    Router::new()
        .nest(API_V1, v1_routes)
        .route("/version", get(info::get_version))
        .layer(middleware::from_fn_with_state(state.clone(), check_auth))
        .layer(middleware::from_fn(add_response_headers))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}
