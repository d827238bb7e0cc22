use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    common::now_ms,
    engine::EngineSnapshot,
    server::{AppState, Connection},
};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Hello {
    #[serde(rename_all = "camelCase")]
    Ready {
        connection: Uuid,
        snapshot: Box<EngineSnapshot>,
    },
}

/// GET /v1/events
pub async fn websocket_handler(
    headers: HeaderMap,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let client_name = headers
        .get("client-name")
        .and_then(|h| h.to_str().ok())
        .map(String::from);
    if let Some(name) = client_name.as_deref() {
        info!("Incoming event subscriber: {}", name);
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, client_name))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, client_name: Option<String>) {
    let id = Uuid::new_v4();
    // Subscribe before the snapshot so nothing falls between the two.
    let mut events = state.engine.subscribe();
    state.connections.insert(
        id,
        Connection {
            id,
            client_name,
            connected_at: now_ms(),
        },
    );
    info!("Event subscriber connected: {}", id);

    let ready = Hello::Ready {
        connection: id,
        snapshot: Box::new(state.engine.snapshot().await),
    };
    if let Ok(json) = serde_json::to_string(&ready) {
        let _ = socket.send(Message::Text(json.into())).await;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else { continue };
                    if let Err(e) = socket.send(Message::Text(json.into())).await {
                        error!("Socket send error: connection={} err={}", id, e);
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Subscriber {} lagged, {} events dropped", id, missed);
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Text(_))) => {
                    warn!("Event socket is one-way; use the REST api to control the mix");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: connection={} err={}", id, e);
                    break;
                }
            },
        }
    }

    state.connections.remove(&id);
    info!("Event subscriber disconnected: {}", id);
}
