use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::{
    common::{AssetId, ChannelName, ContextId, RouteId},
    forest::ForestMatch,
};

/// Why a secondary route was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CloseReason {
    /// The user dismissed the secondary output.
    UserClosed,
    /// The consuming surface left its special mode on its own.
    ConsumerClosed,
    /// The engine is shutting down.
    Teardown,
    /// The recovery monitor gave up.
    RecoveryFailed,
}

/// Everything collaborators outside the engine are told about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    ActiveChannelsChanged {
        top_channels: Vec<ChannelName>,
        levels: BTreeMap<ChannelName, f32>,
    },
    #[serde(rename_all = "camelCase")]
    ForestMatched { forest: Option<ForestMatch> },
    #[serde(rename_all = "camelCase")]
    RouteEstablished {
        route: RouteId,
        voices: usize,
        keep_alive: bool,
    },
    #[serde(rename_all = "camelCase")]
    RouteClosed { route: RouteId, reason: CloseReason },
    /// A suspended context is rendering again.
    #[serde(rename_all = "camelCase")]
    ContextResumed { context: ContextId },
    #[serde(rename_all = "camelCase")]
    RecoveryStarted { route: RouteId, attempt: u32 },
    #[serde(rename_all = "camelCase")]
    ChannelUnavailable {
        channel: ChannelName,
        asset: AssetId,
        reason: String,
    },
}

/// Fan-out of [`SessionEvent`]s. Emitting with no subscribers is fine.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: SessionEvent) {
        trace!("event: {:?}", event);
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
