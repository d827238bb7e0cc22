use serde::Serialize;

use super::types::{AssetId, ChannelName, ContextId};

/// Network or decode failure for a single loop variant.
///
/// `Clone` because one failed decode is reported to every caller that was
/// coalesced onto it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssetError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("failed to decode {asset}: {reason}")]
    Decode { asset: AssetId, reason: String },
    #[error("{asset} contains no playable audio track")]
    NoAudioTrack { asset: AssetId },
}

/// Processing context creation or resume failure. Never fatal to the session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContextError {
    #[error("processing context {0} is closed")]
    Closed(ContextId),
    #[error("processing context {0} is interrupted by the environment")]
    Interrupted(ContextId),
    #[error("processing context is not initialized")]
    Uninitialized,
}

/// Failure establishing a secondary route or connecting a producer into it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    #[error("source belongs to {found}, route belongs to {expected}")]
    ContextMismatch {
        expected: ContextId,
        found: ContextId,
    },
    #[error("no secondary route is established")]
    NoActiveRoute,
    #[error("a secondary route is already registered")]
    AlreadyRegistered,
    #[error("secondary destination is gone")]
    DestinationGone,
    #[error("combined stream would contain no tracks")]
    NoTracks,
    #[error("picture-in-picture is not supported on this platform")]
    Unsupported,
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Failure reported by the consumer surface bound to the combined stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface has no stream attached")]
    Detached,
    #[error("surface refused playback: {0}")]
    PlaybackRejected(String),
}

/// Umbrella error returned by the level-control surface of the mixer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MixError {
    #[error("no such channel: {0}")]
    NoSuchChannel(ChannelName),
    #[error("level {0} is outside [0, 1]")]
    InvalidLevel(f32),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Invalid configuration or catalog entry.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config.toml or config.default.toml not found")]
    NotFound,
    #[error("{0} is empty")]
    Empty(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("catalog channel {channel:?}: {reason}")]
    Catalog { channel: String, reason: String },
}

/// JSON error body returned by the control API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl ApiError {
    fn new(status: u16, error: &str, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: super::types::now_ms(),
            status,
            error: error.into(),
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(400, "Bad Request", message, path)
    }

    pub fn unauthorized(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(401, "Unauthorized", message, path)
    }

    pub fn not_found(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(404, "Not Found", message, path)
    }

    pub fn conflict(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(409, "Conflict", message, path)
    }

    pub fn unavailable(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(503, "Service Unavailable", message, path)
    }

    pub fn internal(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(500, "Internal Server Error", message, path)
    }
}
