use std::{sync::Arc, time::Instant};

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::{configs::Config, engine::SoundscapeEngine};

/// One connected event subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: Uuid,
    pub client_name: Option<String>,
    pub connected_at: u64,
}

/// Top-level application state.
pub struct AppState {
    pub engine: Arc<SoundscapeEngine>,
    pub config: Config,
    pub connections: DashMap<Uuid, Connection>,
    pub started: Instant,
}

impl AppState {
    pub fn new(engine: Arc<SoundscapeEngine>, config: Config) -> Self {
        Self {
            engine,
            config,
            connections: DashMap::new(),
            started: Instant::now(),
        }
    }
}
